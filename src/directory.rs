//! Per-client crypto context directory.
//!
//! Each service owns one directory over its own [`ContextStore`]. Entries are
//! insert-once: the first context stored for a client is authoritative for the
//! lifetime of that store. Local creation is serialized per client so two
//! concurrent first deposits cannot mint divergent contexts.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::codec;
use crate::error::LedgerError;
use crate::scheme::{CryptoContext, CryptoParameters};
use crate::storage::ContextStore;
use crate::types::ClientId;

/// A decoded context together with the exact bytes held in the store.
#[derive(Clone, Debug)]
pub struct ClientContext {
    pub context: CryptoContext,
    pub bytes: Arc<[u8]>,
}

pub struct ContextDirectory {
    store: Arc<dyn ContextStore>,
    cache: DashMap<ClientId, ClientContext>,
    creation_guards: DashMap<ClientId, Arc<Mutex<()>>>,
}

impl ContextDirectory {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            creation_guards: DashMap::new(),
        }
    }

    pub fn get(&self, client: &ClientId) -> Result<Option<ClientContext>, LedgerError> {
        if let Some(hit) = self.cache.get(client) {
            return Ok(Some(hit.value().clone()));
        }
        let Some(bytes) = self.store.get(client)? else {
            return Ok(None);
        };
        let resolved = ClientContext {
            context: codec::decode_context(&bytes)?,
            bytes: bytes.into(),
        };
        self.cache.insert(client.clone(), resolved.clone());
        Ok(Some(resolved))
    }

    /// Stored bytes for `client`, without decoding them.
    pub fn get_bytes(&self, client: &ClientId) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.store.get(client)?)
    }

    /// Generates a fresh context and stores it unless one already exists, in
    /// which case the existing context is returned instead.
    pub fn create_and_store(
        &self,
        client: &ClientId,
        params: &CryptoParameters,
    ) -> Result<ClientContext, LedgerError> {
        let context = CryptoContext::generate(params)?;
        let bytes: Arc<[u8]> = codec::encode_context(&context).into();
        if !self.store.insert_if_absent(client, &bytes)? {
            debug!(client = %client, "context already present, keeping existing entry");
            return self.get(client)?.ok_or_else(|| {
                LedgerError::Internal(format!("context for {client} vanished after insert"))
            });
        }
        info!(client = %client, context_id = %context.id(), bytes = bytes.len(), "created client context");
        let resolved = ClientContext { context, bytes };
        self.cache.insert(client.clone(), resolved.clone());
        Ok(resolved)
    }

    pub fn get_or_create(
        &self,
        client: &ClientId,
        params: &CryptoParameters,
    ) -> Result<ClientContext, LedgerError> {
        if let Some(existing) = self.get(client)? {
            return Ok(existing);
        }
        let guard = self
            .creation_guards
            .entry(client.clone())
            .or_default()
            .clone();
        let resolved = {
            let _held = guard.lock();
            match self.get(client) {
                Ok(Some(existing)) => Ok(existing),
                Ok(None) => self.create_and_store(client, params),
                Err(err) => Err(err),
            }
        };
        drop(guard);
        // Only the map's own handle left means no caller is waiting on it.
        self.creation_guards
            .remove_if(client, |_, guard| Arc::strong_count(guard) == 1);
        resolved
    }

    /// Persists context bytes received from the counterpart without decoding
    /// them. Returns `false` when an entry already existed and the bytes were
    /// discarded.
    pub fn store_received(&self, client: &ClientId, context: &[u8]) -> Result<bool, LedgerError> {
        Ok(self.store.insert_if_absent(client, context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryContextStore;

    fn params() -> CryptoParameters {
        CryptoParameters::default().with_ring_degree(2048)
    }

    fn client(id: &str) -> ClientId {
        ClientId::new(id).unwrap()
    }

    #[test]
    fn get_or_create_is_stable() {
        let store = Arc::new(MemoryContextStore::new());
        let directory = ContextDirectory::new(store.clone());
        assert!(directory.get(&client("c1")).unwrap().is_none());

        let first = directory.get_or_create(&client("c1"), &params()).unwrap();
        let second = directory.get_or_create(&client("c1"), &params()).unwrap();
        assert_eq!(first.context.id(), second.context.id());
        assert_eq!(first.bytes, second.bytes);
        assert_eq!(store.len(), 1);
        assert_eq!(
            directory.get_bytes(&client("c1")).unwrap().unwrap(),
            first.bytes.to_vec()
        );
    }

    #[test]
    fn creation_guards_are_released() {
        let directory = ContextDirectory::new(Arc::new(MemoryContextStore::new()));
        for id in ["c1", "c2", "c3"] {
            directory.get_or_create(&client(id), &params()).unwrap();
        }
        assert!(directory.creation_guards.is_empty());
    }

    #[test]
    fn create_keeps_the_existing_entry() {
        let directory = ContextDirectory::new(Arc::new(MemoryContextStore::new()));
        let first = directory.create_and_store(&client("c1"), &params()).unwrap();
        let second = directory.create_and_store(&client("c1"), &params()).unwrap();
        assert_eq!(first.context.id(), second.context.id());
    }

    #[test]
    fn received_bytes_are_insert_or_ignore() {
        let directory = ContextDirectory::new(Arc::new(MemoryContextStore::new()));
        assert!(directory.store_received(&client("c1"), b"first").unwrap());
        assert!(!directory.store_received(&client("c1"), b"second").unwrap());
        assert_eq!(directory.get_bytes(&client("c1")).unwrap().unwrap(), b"first");
    }

    #[test]
    fn undecodable_entry_is_a_codec_error() {
        let directory = ContextDirectory::new(Arc::new(MemoryContextStore::new()));
        directory.store_received(&client("c1"), b"junk").unwrap();
        assert!(matches!(
            directory.get(&client("c1")),
            Err(LedgerError::Codec(_))
        ));
    }
}
