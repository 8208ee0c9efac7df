//! Two-party encrypted transaction ledger.
//!
//! A local custodian holds the only secret key and encrypts each deposit; an
//! untrusted cloud service stores the ciphertexts and sums them under
//! homomorphic encryption, returning a ciphertext only the custodian can open.

pub mod client;
pub mod codec;
pub mod config;
pub mod custodian;
pub mod directory;
pub mod error;
pub mod http;
pub mod logging;
pub mod scheme;
pub mod server;
pub mod storage;
pub mod transport;
pub mod types;
pub mod wire;

pub use client::LocalLedgerClient;
pub use custodian::KeyCustodian;
pub use directory::{ClientContext, ContextDirectory};
pub use error::{ErrorKind, LedgerError};
pub use scheme::{CryptoContext, CryptoParameters};
pub use server::CloudLedgerServer;
pub use types::{ClientId, Label, ScalarValue, Transaction};

/// Runs CPU-bound or blocking work off the async executor.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, LedgerError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| LedgerError::Internal(err.to_string()))?
}
