use std::sync::Arc;

use async_trait::async_trait;

use super::CloudTransport;
use crate::error::LedgerError;
use crate::run_blocking;
use crate::server::CloudLedgerServer;
use crate::types::ClientId;
use crate::wire::{AggregateReply, IngestAck, IngestRequest};

/// Calls a [`CloudLedgerServer`] living in the same process. Server failures
/// are reported as `Remote`, the same way an HTTP hop would report them.
#[derive(Clone)]
pub struct InProcessTransport {
    server: Arc<CloudLedgerServer>,
}

impl InProcessTransport {
    pub fn new(server: Arc<CloudLedgerServer>) -> Self {
        Self { server }
    }
}

fn remote(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Internal(_) => err,
        other => LedgerError::Remote(other.to_string()),
    }
}

#[async_trait]
impl CloudTransport for InProcessTransport {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestAck, LedgerError> {
        let server = self.server.clone();
        run_blocking(move || server.ingest(&request).map_err(remote)).await
    }

    async fn aggregate(&self, client: &ClientId) -> Result<AggregateReply, LedgerError> {
        let server = self.server.clone();
        let client = client.clone();
        run_blocking(move || server.aggregate_reply(&client).map_err(remote)).await
    }
}
