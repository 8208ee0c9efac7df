use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use zeroize::Zeroizing;

use super::{ContextStore, KeyBlobStore, StorageError, TransactionStore};
use crate::types::{ClientId, Label, Transaction};

/// SQLite-backed store. One connection guarded by a mutex; every trait method
/// is a single statement, so rows are read or written atomically.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS client_contexts (
                client_id TEXT PRIMARY KEY,
                context BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL,
                label TEXT NOT NULL,
                value BLOB NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_client
                ON transactions(client_id);

            CREATE TABLE IF NOT EXISTS key_blobs (
                name TEXT PRIMARY KEY,
                bytes BLOB NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

impl ContextStore for SqliteStore {
    fn get(&self, client: &ClientId) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn.lock();
        let context = conn
            .query_row(
                "SELECT context FROM client_contexts WHERE client_id = ?1",
                params![client.as_str()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(context)
    }

    fn insert_if_absent(&self, client: &ClientId, context: &[u8]) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO client_contexts (client_id, context) VALUES (?1, ?2)",
            params![client.as_str(), context],
        )?;
        Ok(changed == 1)
    }
}

impl TransactionStore for SqliteStore {
    fn append(
        &self,
        client: &ClientId,
        label: &Label,
        encrypted_value: &[u8],
    ) -> Result<u64, StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO transactions (client_id, label, value) VALUES (?1, ?2, ?3)",
            params![client.as_str(), label.as_str(), encrypted_value],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    fn list_for_client(&self, client: &ClientId) -> Result<Vec<Transaction>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, client_id, label, value FROM transactions WHERE client_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![client.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, client_id, label, value) = row?;
            let client_id = ClientId::new(client_id)
                .map_err(|_| StorageError::Corrupt(format!("transaction {id} has empty client id")))?;
            out.push(Transaction {
                id: id as u64,
                client_id,
                label: Label(label),
                encrypted_value: value,
            });
        }
        Ok(out)
    }
}

impl KeyBlobStore for SqliteStore {
    fn load(&self, name: &str) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        let conn = self.conn.lock();
        let bytes = conn
            .query_row(
                "SELECT bytes FROM key_blobs WHERE name = ?1",
                params![name],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(bytes.map(Zeroizing::new))
    }

    fn store(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO key_blobs (name, bytes) VALUES (?1, ?2)",
            params![name, bytes],
        )?;
        if changed == 0 {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }
}
