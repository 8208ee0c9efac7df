//! Durable stores behind the ledger.
//!
//! The protocol needs three narrow capabilities: a per-client context table
//! with insert-or-ignore semantics, an append-only transaction table and a
//! pair of named key blobs. Each is a trait so the services can run over
//! SQLite in production and over in-process maps in tests.

use std::path::PathBuf;

use thiserror::Error;
use zeroize::Zeroizing;

use crate::types::{ClientId, Label, Transaction};

pub mod fs;
pub mod memory;
pub mod sqlite;

pub use fs::FsKeyStore;
pub use memory::{MemoryContextStore, MemoryKeyStore, MemoryTransactionStore};
pub use sqlite::SqliteStore;

/// Well-known name of the public key blob.
pub const PUBLIC_KEY_BLOB: &str = "key-public";
/// Well-known name of the secret key blob.
pub const SECRET_KEY_BLOB: &str = "key-private";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid blob name {0:?}")]
    InvalidName(String),
    #[error("blob {0:?} already exists")]
    AlreadyExists(String),
    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

pub trait ContextStore: Send + Sync {
    fn get(&self, client: &ClientId) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stores `context` unless an entry for `client` exists. Returns whether
    /// the bytes were written.
    fn insert_if_absent(&self, client: &ClientId, context: &[u8]) -> Result<bool, StorageError>;
}

pub trait TransactionStore: Send + Sync {
    /// Appends a row and returns its id.
    fn append(
        &self,
        client: &ClientId,
        label: &Label,
        encrypted_value: &[u8],
    ) -> Result<u64, StorageError>;

    fn list_for_client(&self, client: &ClientId) -> Result<Vec<Transaction>, StorageError>;
}

/// Write-once named blobs. Key material is never overwritten in place.
pub trait KeyBlobStore: Send + Sync {
    fn load(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError>;

    /// Fails with [`StorageError::AlreadyExists`] if `name` is taken.
    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;
}
