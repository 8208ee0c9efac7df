use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::ClientId;
use crate::wire::{AggregateReply, IngestAck, IngestRequest};

pub mod http;
pub mod in_process;

pub use http::HttpTransport;
pub use in_process::InProcessTransport;

/// Request/response channel from the local service to the cloud service.
/// No retries are attempted; failures surface as `Remote` or `Timeout`.
#[async_trait]
pub trait CloudTransport: Send + Sync {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestAck, LedgerError>;

    async fn aggregate(&self, client: &ClientId) -> Result<AggregateReply, LedgerError>;
}
