//! Cloud side of the ledger: stores opaque ciphertexts and sums them under
//! encryption. Holds no key material and has no way to produce plaintext.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::codec;
use crate::directory::ContextDirectory;
use crate::error::LedgerError;
use crate::storage::{ContextStore, TransactionStore};
use crate::types::ClientId;
use crate::wire::{AggregateReply, IngestAck, IngestRequest};

pub struct CloudLedgerServer {
    transactions: Arc<dyn TransactionStore>,
    directory: ContextDirectory,
}

impl CloudLedgerServer {
    pub fn new(transactions: Arc<dyn TransactionStore>, contexts: Arc<dyn ContextStore>) -> Self {
        Self {
            transactions,
            directory: ContextDirectory::new(contexts),
        }
    }

    #[instrument(skip_all, fields(client = %request.client_id, label = %request.label))]
    pub fn ingest(&self, request: &IngestRequest) -> Result<IngestAck, LedgerError> {
        // Context first: a stored row must always have a context to sum under.
        let context_stored = self
            .directory
            .store_received(&request.client_id, &request.context)?;
        let id = self.transactions.append(
            &request.client_id,
            &request.label,
            &request.encrypted_value,
        )?;
        debug!(
            id,
            context_stored,
            value_bytes = request.encrypted_value.len(),
            "transaction ingested"
        );
        Ok(IngestAck::success())
    }

    /// Homomorphic sum of every stored ciphertext for `client`, encoded.
    #[instrument(skip_all, fields(client = %client))]
    pub fn aggregate(&self, client: &ClientId) -> Result<Vec<u8>, LedgerError> {
        let rows = self.transactions.list_for_client(client)?;
        if rows.is_empty() {
            return Err(LedgerError::NoTransactions(client.clone()));
        }
        let resolved = self
            .directory
            .get(client)?
            .ok_or_else(|| LedgerError::UnknownClient(client.clone()))?;

        let ciphertexts = rows
            .iter()
            .map(|row| codec::decode_ciphertext(&resolved.context, &row.encrypted_value))
            .collect::<Result<Vec<_>, _>>()?;
        let sum = resolved.context.sum(&ciphertexts)?;
        let bytes = codec::encode_ciphertext(&sum);
        debug!(rows = rows.len(), bytes = bytes.len(), "aggregated balance");
        Ok(bytes)
    }

    /// [`aggregate`](Self::aggregate) with the empty ledger folded into the reply.
    pub fn aggregate_reply(&self, client: &ClientId) -> Result<AggregateReply, LedgerError> {
        match self.aggregate(client) {
            Ok(bytes) => Ok(AggregateReply::Sum(bytes)),
            Err(LedgerError::NoTransactions(_)) => Ok(AggregateReply::NoTransactions),
            Err(err) => Err(err),
        }
    }
}
