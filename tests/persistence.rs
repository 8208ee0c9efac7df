use encrypted_ledger::storage::{ContextStore, FsKeyStore, SqliteStore, SECRET_KEY_BLOB};
use encrypted_ledger::transport::InProcessTransport;
use encrypted_ledger::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn params() -> CryptoParameters {
    CryptoParameters::default().with_ring_degree(2048)
}

fn id(raw: &str) -> ClientId {
    ClientId::new(raw).unwrap()
}

struct Stack {
    client: LocalLedgerClient,
    local_store: Arc<SqliteStore>,
}

/// Opens both services over the files in `dir`, the way the binaries do.
fn open_stack(dir: &Path) -> Stack {
    let keys = FsKeyStore::open(dir.join("keys")).unwrap();
    let custodian = KeyCustodian::ensure_key_pair(&keys, &params()).unwrap();

    let cloud_store = Arc::new(SqliteStore::open(dir.join("transactions.db")).unwrap());
    let server = Arc::new(CloudLedgerServer::new(cloud_store.clone(), cloud_store));

    let local_store = Arc::new(SqliteStore::open(dir.join("local_contexts.db")).unwrap());
    let client = LocalLedgerClient::new(
        Arc::new(custodian),
        Arc::new(ContextDirectory::new(local_store.clone())),
        Arc::new(InProcessTransport::new(server)),
    );
    Stack {
        client,
        local_store,
    }
}

#[tokio::test]
async fn restart_keeps_keys_contexts_and_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let c1 = id("c1");

    let context_before = {
        let stack = open_stack(dir.path());
        stack.client.deposit(&c1, &Label::new("t1"), 100.0).await.unwrap();
        stack.client.deposit(&c1, &Label::new("t2"), 50.5).await.unwrap();
        stack.local_store.get(&c1).unwrap().unwrap()
    };

    let stack = open_stack(dir.path());
    assert_eq!(stack.local_store.get(&c1).unwrap().unwrap(), context_before);
    let balance = stack.client.get_balance(&c1).await.unwrap();
    assert!((balance - 150.5).abs() < 1e-4, "{balance}");

    stack.client.deposit(&c1, &Label::new("t3"), -0.5).await.unwrap();
    let balance = stack.client.get_balance(&c1).await.unwrap();
    assert!((balance - 150.0).abs() < 1e-4, "{balance}");
}

#[test]
fn missing_secret_key_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let key_dir = dir.path().join("keys");
    KeyCustodian::ensure_key_pair(&FsKeyStore::open(&key_dir).unwrap(), &params()).unwrap();

    fs::remove_file(key_dir.join(format!("{SECRET_KEY_BLOB}.bin"))).unwrap();
    let err =
        KeyCustodian::ensure_key_pair(&FsKeyStore::open(&key_dir).unwrap(), &params()).unwrap_err();
    assert!(matches!(err, LedgerError::KeyLoad(_)), "{err}");
    assert!(
        !key_dir.join(format!("{SECRET_KEY_BLOB}.bin")).exists(),
        "secret key must not be regenerated"
    );
}

#[test]
fn truncated_secret_key_refuses_to_start() {
    let dir = tempfile::tempdir().unwrap();
    let key_dir = dir.path().join("keys");
    KeyCustodian::ensure_key_pair(&FsKeyStore::open(&key_dir).unwrap(), &params()).unwrap();

    let secret_path = key_dir.join(format!("{SECRET_KEY_BLOB}.bin"));
    let bytes = fs::read(&secret_path).unwrap();
    fs::write(&secret_path, &bytes[..bytes.len() - 4]).unwrap();
    let err =
        KeyCustodian::ensure_key_pair(&FsKeyStore::open(&key_dir).unwrap(), &params()).unwrap_err();
    assert!(matches!(err, LedgerError::KeyLoad(_)), "{err}");
}

#[test]
fn keys_persisted_under_other_parameters_refuse_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let key_dir = dir.path().join("keys");
    KeyCustodian::ensure_key_pair(&FsKeyStore::open(&key_dir).unwrap(), &params()).unwrap();

    let mut changed = params();
    changed.batch_size = 16;
    let err =
        KeyCustodian::ensure_key_pair(&FsKeyStore::open(&key_dir).unwrap(), &changed).unwrap_err();
    assert!(matches!(err, LedgerError::KeyLoad(_)), "{err}");
}

#[test]
fn sqlite_key_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.db");
    let ctx = CryptoContext::generate(&params()).unwrap();

    let ct = {
        let store = SqliteStore::open(&path).unwrap();
        let custodian = KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
        custodian.encrypt(&ctx, 64.0).unwrap()
    };

    let store = SqliteStore::open(&path).unwrap();
    let custodian = KeyCustodian::ensure_key_pair(&store, &params()).unwrap();
    assert!((custodian.decrypt(&ctx, &ct).unwrap() - 64.0).abs() < 1e-4);
}
