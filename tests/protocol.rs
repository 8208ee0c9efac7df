use encrypted_ledger::codec;
use encrypted_ledger::scheme::SchemeError;
use encrypted_ledger::storage::{
    ContextStore, MemoryContextStore, MemoryKeyStore, MemoryTransactionStore,
};
use encrypted_ledger::transport::InProcessTransport;
use encrypted_ledger::wire::{AggregateReply, IngestRequest, NO_TRANSACTIONS_SENTINEL};
use encrypted_ledger::*;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

const TOLERANCE: f64 = 1e-4;

fn params() -> CryptoParameters {
    CryptoParameters::default().with_ring_degree(2048)
}

fn id(raw: &str) -> ClientId {
    ClientId::new(raw).unwrap()
}

fn label(raw: &str) -> Label {
    Label::new(raw)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < TOLERANCE,
        "expected {expected}, got {actual}"
    );
}

struct Harness {
    custodian: Arc<KeyCustodian>,
    client: LocalLedgerClient,
    server: Arc<CloudLedgerServer>,
    local_contexts: Arc<MemoryContextStore>,
    cloud_contexts: Arc<MemoryContextStore>,
    transactions: Arc<MemoryTransactionStore>,
}

impl Harness {
    fn new() -> Self {
        let keys = MemoryKeyStore::new();
        let custodian = Arc::new(KeyCustodian::ensure_key_pair(&keys, &params()).unwrap());
        let cloud_contexts = Arc::new(MemoryContextStore::new());
        let transactions = Arc::new(MemoryTransactionStore::new());
        let server = Arc::new(CloudLedgerServer::new(
            transactions.clone(),
            cloud_contexts.clone(),
        ));
        let local_contexts = Arc::new(MemoryContextStore::new());
        let client = LocalLedgerClient::new(
            custodian.clone(),
            Arc::new(ContextDirectory::new(local_contexts.clone())),
            Arc::new(InProcessTransport::new(server.clone())),
        );
        Self {
            custodian,
            client,
            server,
            local_contexts,
            cloud_contexts,
            transactions,
        }
    }

    /// Second local client sharing the custodian and cloud but not the
    /// local context directory.
    fn sibling_client(&self) -> LocalLedgerClient {
        LocalLedgerClient::new(
            self.custodian.clone(),
            Arc::new(ContextDirectory::new(Arc::new(MemoryContextStore::new()))),
            Arc::new(InProcessTransport::new(self.server.clone())),
        )
    }
}

#[tokio::test]
async fn balance_is_the_sum_of_deposits() {
    let h = Harness::new();
    let c1 = id("c1");
    h.client.deposit(&c1, &label("t1"), 100.0).await.unwrap();
    let ack = h.client.deposit(&c1, &label("t2"), 50.5).await.unwrap();
    assert!(ack.is_success());

    assert_close(h.client.get_balance(&c1).await.unwrap(), 150.5);
    assert_eq!(h.transactions.len(), 2);
    assert_eq!(h.local_contexts.len(), 1);
    assert_eq!(h.cloud_contexts.len(), 1);
}

#[tokio::test]
async fn unseen_client_has_no_transactions() {
    let h = Harness::new();
    let err = h.client.get_balance(&id("new-client")).await.unwrap_err();
    assert!(matches!(err, LedgerError::NoTransactions(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::NoData);

    let reply = h.server.aggregate_reply(&id("new-client")).unwrap();
    assert_eq!(reply, AggregateReply::NoTransactions);
    assert_eq!(reply.to_envelope().balance, NO_TRANSACTIONS_SENTINEL);
}

#[tokio::test]
async fn signed_deposits_cancel_to_zero() {
    let h = Harness::new();
    let c2 = id("c2");
    h.client.deposit(&c2, &label("debit"), -30.0).await.unwrap();
    h.client.deposit(&c2, &label("credit"), 30.0).await.unwrap();
    let balance = h.client.get_balance(&c2).await.unwrap();
    assert_close(balance, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_deposits_share_one_context() {
    let h = Harness::new();
    let c3 = id("c3");

    let first = {
        let client = h.client.clone();
        let c3 = c3.clone();
        tokio::spawn(async move { client.deposit(&c3, &label("a"), 10.0).await })
    };
    let second = {
        let client = h.client.clone();
        let c3 = c3.clone();
        tokio::spawn(async move { client.deposit(&c3, &label("b"), 20.25).await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(h.local_contexts.len(), 1);
    assert_eq!(h.cloud_contexts.len(), 1);
    assert_eq!(
        h.local_contexts.get(&c3).unwrap(),
        h.cloud_contexts.get(&c3).unwrap(),
        "both sides must hold byte-identical contexts"
    );
    assert_close(h.client.get_balance(&c3).await.unwrap(), 30.25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deposits_across_clients_stay_isolated() {
    let h = Harness::new();
    let mut tasks = Vec::new();
    for client_idx in 0..4 {
        for deposit in 0..5 {
            let client = h.client.clone();
            tasks.push(tokio::spawn(async move {
                let owner = id(&format!("tenant-{client_idx}"));
                let amount = (client_idx * 100 + deposit) as f64 + 0.25;
                client
                    .deposit(&owner, &label(&format!("d{deposit}")), amount)
                    .await
            }));
        }
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.local_contexts.len(), 4);
    for client_idx in 0..4 {
        let owner = id(&format!("tenant-{client_idx}"));
        let expected: f64 = (0..5)
            .map(|deposit| (client_idx * 100 + deposit) as f64 + 0.25)
            .sum();
        assert_close(h.client.get_balance(&owner).await.unwrap(), expected);
    }
}

#[test]
fn encryption_round_trips_random_values() {
    let mut rng = ChaCha20Rng::seed_from_u64(7);
    let ctx = CryptoContext::generate(&params()).unwrap();
    let keys = ctx.generate_key_pair();
    for _ in 0..16 {
        let value = (rng.random_range(-1_000_000.0..1_000_000.0f64) * 100.0).round() / 100.0;
        let ct = ctx.encrypt(&keys.public, value).unwrap();
        assert_close(ctx.decrypt(&keys.secret, &ct).unwrap(), value);
    }
}

#[test]
fn homomorphic_sum_ignores_fold_order() {
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let ctx = CryptoContext::generate(&params()).unwrap();
    let keys = ctx.generate_key_pair();
    let values: Vec<f64> = (0..12).map(|_| rng.random_range(-500.0..500.0)).collect();
    let mut cts: Vec<_> = values
        .iter()
        .map(|v| ctx.encrypt(&keys.public, *v).unwrap())
        .collect();
    let expected: f64 = values.iter().sum();

    for _ in 0..3 {
        cts.shuffle(&mut rng);
        let sum = ctx.sum(&cts).unwrap();
        assert_close(ctx.decrypt(&keys.secret, &sum).unwrap(), expected);
    }
}

#[test]
fn keys_from_other_parameters_cannot_decrypt() {
    let ctx_a = CryptoContext::generate(&params()).unwrap();
    let keys_a = ctx_a.generate_key_pair();
    let ct = ctx_a.encrypt(&keys_a.public, 42.0).unwrap();

    let mut other = params();
    other.scaling_bits = 30;
    let custodian_b =
        KeyCustodian::ensure_key_pair(&MemoryKeyStore::new(), &other).unwrap();
    let err = custodian_b.decrypt(&ctx_a, &ct).unwrap_err();
    assert!(
        matches!(
            err,
            LedgerError::Scheme(SchemeError::ParameterMismatch { .. })
        ),
        "{err}"
    );
}

#[tokio::test]
async fn first_received_context_wins_on_the_cloud() {
    let h = Harness::new();
    let c4 = id("c4");
    let ctx = CryptoContext::generate(&params()).unwrap();
    let keys = ctx.generate_key_pair();
    let value = codec::encode_ciphertext(&ctx.encrypt(&keys.public, 1.0).unwrap());
    let first_context = codec::encode_context(&ctx);
    let second_context =
        codec::encode_context(&CryptoContext::generate(&params()).unwrap());
    assert_ne!(first_context, second_context);

    for context in [first_context.clone(), second_context] {
        h.server
            .ingest(&IngestRequest {
                client_id: c4.clone(),
                label: label("t"),
                encrypted_value: value.clone(),
                context,
            })
            .unwrap();
    }
    assert_eq!(h.cloud_contexts.get(&c4).unwrap().unwrap(), first_context);
}

#[tokio::test]
async fn diverged_cloud_context_fails_loudly() {
    let h = Harness::new();
    let c9 = id("c9");

    // The cloud already holds a context for c9 from another parameter family.
    let mut foreign = params();
    foreign.scaling_bits = 16;
    let foreign_ctx = CryptoContext::generate(&foreign).unwrap();
    assert!(h
        .cloud_contexts
        .insert_if_absent(&c9, &codec::encode_context(&foreign_ctx))
        .unwrap());

    h.client.deposit(&c9, &label("t1"), 75.0).await.unwrap();
    let err = h.client.get_balance(&c9).await.unwrap_err();
    assert!(matches!(err, LedgerError::Remote(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::SystemFailure);
}

#[tokio::test]
async fn cloud_context_with_same_parameters_still_sums_correctly() {
    let h = Harness::new();
    let c8 = id("c8");
    let stale = CryptoContext::generate(&params()).unwrap();
    h.cloud_contexts
        .insert_if_absent(&c8, &codec::encode_context(&stale))
        .unwrap();

    h.client.deposit(&c8, &label("t1"), 12.5).await.unwrap();
    h.client.deposit(&c8, &label("t2"), 7.5).await.unwrap();
    assert_close(h.client.get_balance(&c8).await.unwrap(), 20.0);
}

#[tokio::test]
async fn balance_without_local_context_is_unknown_client() {
    let h = Harness::new();
    let c5 = id("c5");
    h.sibling_client()
        .deposit(&c5, &label("elsewhere"), 5.0)
        .await
        .unwrap();

    let err = h.client.get_balance(&c5).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnknownClient(_)), "{err}");
    assert_eq!(err.kind(), ErrorKind::ClientUnknown);
}

#[tokio::test]
async fn unencodable_values_are_rejected() {
    let h = Harness::new();
    let c6 = id("c6");
    for bad in [f64::NAN, f64::INFINITY, 1.0e12] {
        let err = h.client.deposit(&c6, &label("bad"), bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected, "{err}");
    }
    assert!(h.transactions.is_empty());
}
