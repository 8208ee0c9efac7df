use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Tenant identifier. Primary key for every piece of per-client state.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("client id must not be empty")]
pub struct EmptyClientId;

impl ClientId {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyClientId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EmptyClientId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = EmptyClientId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied memo attached to a transaction (timestamp, reference, ...).
/// The ledger never interprets it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub String);

impl Label {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monetary amount carried in slot 0 of an encrypted plaintext.
pub type ScalarValue = f64;

/// Append-only ledger row owned by the cloud side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: u64,
    pub client_id: ClientId,
    pub label: Label,
    pub encrypted_value: Vec<u8>,
}

/// Rounds a decrypted balance to the two decimal digits shown to callers.
pub fn round_to_cents(value: ScalarValue) -> ScalarValue {
    (value * 100.0).round() / 100.0
}
