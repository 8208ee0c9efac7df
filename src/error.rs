use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::scheme::SchemeError;
use crate::storage::StorageError;
use crate::types::{ClientId, EmptyClientId};

/// Failure classes surfaced to callers of deposit/balance so that an empty
/// ledger, an unknown client and a broken system are never confused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    ClientUnknown,
    NoData,
    Rejected,
    SystemFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ClientUnknown => "unknown_client",
            ErrorKind::NoData => "no_transactions",
            ErrorKind::Rejected => "rejected",
            ErrorKind::SystemFailure => "system_failure",
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Persisted key material is partial, unreadable or belongs to other parameters.
    #[error("key material could not be loaded: {0}")]
    KeyLoad(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    #[error("no crypto context known for client {0}")]
    UnknownClient(ClientId),
    #[error("no transactions recorded for client {0}")]
    NoTransactions(ClientId),
    #[error("remote ledger error: {0}")]
    Remote(String),
    #[error("remote ledger did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("worker task failed: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::UnknownClient(_) => ErrorKind::ClientUnknown,
            LedgerError::NoTransactions(_) => ErrorKind::NoData,
            LedgerError::InvalidInput(_) | LedgerError::Codec(_) => ErrorKind::Rejected,
            LedgerError::Scheme(SchemeError::ValueOutOfRange { .. })
            | LedgerError::Scheme(SchemeError::NonFiniteValue) => ErrorKind::Rejected,
            LedgerError::KeyLoad(_)
            | LedgerError::Scheme(_)
            | LedgerError::Remote(_)
            | LedgerError::Timeout(_)
            | LedgerError::Storage(_)
            | LedgerError::Internal(_) => ErrorKind::SystemFailure,
        }
    }
}

impl From<EmptyClientId> for LedgerError {
    fn from(err: EmptyClientId) -> Self {
        LedgerError::InvalidInput(err.to_string())
    }
}
