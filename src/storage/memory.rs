use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use zeroize::Zeroizing;

use super::{ContextStore, KeyBlobStore, StorageError, TransactionStore};
use crate::types::{ClientId, Label, Transaction};

#[derive(Default)]
pub struct MemoryContextStore {
    contexts: DashMap<ClientId, Vec<u8>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

impl ContextStore for MemoryContextStore {
    fn get(&self, client: &ClientId) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.contexts.get(client).map(|entry| entry.value().clone()))
    }

    fn insert_if_absent(&self, client: &ClientId, context: &[u8]) -> Result<bool, StorageError> {
        match self.contexts.entry(client.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(context.to_vec());
                Ok(true)
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryTransactionStore {
    rows: RwLock<Vec<Transaction>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl TransactionStore for MemoryTransactionStore {
    fn append(
        &self,
        client: &ClientId,
        label: &Label,
        encrypted_value: &[u8],
    ) -> Result<u64, StorageError> {
        let mut rows = self.rows.write();
        let id = rows.len() as u64 + 1;
        rows.push(Transaction {
            id,
            client_id: client.clone(),
            label: label.clone(),
            encrypted_value: encrypted_value.to_vec(),
        });
        Ok(id)
    }

    fn list_for_client(&self, client: &ClientId) -> Result<Vec<Transaction>, StorageError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| &row.client_id == client)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryKeyStore {
    blobs: DashMap<String, Zeroizing<Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops a blob; used to simulate lost key material.
    pub fn remove(&self, name: &str) -> bool {
        self.blobs.remove(name).is_some()
    }
}

impl KeyBlobStore for MemoryKeyStore {
    fn load(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        Ok(self.blobs.get(name).map(|entry| entry.value().clone()))
    }

    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        match self.blobs.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Zeroizing::new(bytes.to_vec()));
                Ok(())
            }
        }
    }
}
