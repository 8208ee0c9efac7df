//! Local side of the ledger: encrypts deposits for the cloud and decrypts the
//! aggregates it sends back.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::codec;
use crate::custodian::KeyCustodian;
use crate::directory::ContextDirectory;
use crate::error::LedgerError;
use crate::run_blocking;
use crate::transport::CloudTransport;
use crate::types::{round_to_cents, ClientId, Label, ScalarValue};
use crate::wire::{AggregateReply, IngestAck, IngestRequest};

#[derive(Clone)]
pub struct LocalLedgerClient {
    custodian: Arc<KeyCustodian>,
    directory: Arc<ContextDirectory>,
    transport: Arc<dyn CloudTransport>,
}

impl LocalLedgerClient {
    pub fn new(
        custodian: Arc<KeyCustodian>,
        directory: Arc<ContextDirectory>,
        transport: Arc<dyn CloudTransport>,
    ) -> Self {
        Self {
            custodian,
            directory,
            transport,
        }
    }

    pub fn directory(&self) -> &ContextDirectory {
        &self.directory
    }

    #[instrument(skip_all, fields(client = %client, label = %label))]
    pub async fn deposit(
        &self,
        client: &ClientId,
        label: &Label,
        value: ScalarValue,
    ) -> Result<IngestAck, LedgerError> {
        let custodian = self.custodian.clone();
        let directory = self.directory.clone();
        let owner = client.clone();
        let (encrypted_value, context) = run_blocking(move || {
            let resolved = directory.get_or_create(&owner, custodian.params())?;
            let ciphertext = custodian.encrypt(&resolved.context, value)?;
            Ok((codec::encode_ciphertext(&ciphertext), resolved.bytes.to_vec()))
        })
        .await?;

        debug!(value_bytes = encrypted_value.len(), "value encrypted");
        let ack = self
            .transport
            .ingest(IngestRequest {
                client_id: client.clone(),
                label: label.clone(),
                encrypted_value,
                context,
            })
            .await?;
        info!("deposit recorded");
        Ok(ack)
    }

    /// Decrypted balance rounded to cents. An empty ledger is
    /// [`LedgerError::NoTransactions`], never zero.
    #[instrument(skip_all, fields(client = %client))]
    pub async fn get_balance(&self, client: &ClientId) -> Result<ScalarValue, LedgerError> {
        let bytes = match self.transport.aggregate(client).await? {
            AggregateReply::Sum(bytes) => bytes,
            AggregateReply::NoTransactions => {
                return Err(LedgerError::NoTransactions(client.clone()))
            }
        };

        let custodian = self.custodian.clone();
        let directory = self.directory.clone();
        let owner = client.clone();
        let balance = run_blocking(move || {
            let resolved = directory
                .get(&owner)?
                .ok_or_else(|| LedgerError::UnknownClient(owner.clone()))?;
            let ciphertext = codec::decode_ciphertext(&resolved.context, &bytes)?;
            let value = custodian.decrypt(&resolved.context, &ciphertext)?;
            Ok(round_to_cents(value))
        })
        .await?;

        debug!("balance decrypted");
        Ok(balance)
    }
}
