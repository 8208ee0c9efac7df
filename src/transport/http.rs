use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::CloudTransport;
use crate::error::LedgerError;
use crate::types::ClientId;
use crate::wire::{AggregateReply, BalanceEnvelope, BalanceRequest, ErrorBody, IngestAck, IngestRequest};

const OCTET_STREAM: &str = "application/octet-stream";

/// `reqwest` client for the cloud service's HTTP surface.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let mut base = Url::parse(base_url)
            .map_err(|err| LedgerError::InvalidInput(format!("cloud url {base_url:?}: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::Internal(format!("building http client: {err}")))?;
        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, LedgerError> {
        self.base
            .join(path)
            .map_err(|err| LedgerError::Internal(format!("joining {path}: {err}")))
    }

    fn transport_error(&self, err: reqwest::Error) -> LedgerError {
        if err.is_timeout() {
            LedgerError::Timeout(self.timeout)
        } else if err.is_decode() {
            LedgerError::Remote(format!("malformed reply: {err}"))
        } else {
            LedgerError::Remote(err.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, LedgerError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|body| format!("{}: {}", body.error, body.message))
                .unwrap_or(body);
            return Err(LedgerError::Remote(format!("cloud answered {status}: {message}")));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| self.transport_error(err))
    }
}

fn binary_part(bytes: Vec<u8>, file_name: &'static str) -> Result<Part, LedgerError> {
    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(OCTET_STREAM)
        .map_err(|err| LedgerError::Internal(format!("building multipart body: {err}")))
}

#[async_trait]
impl CloudTransport for HttpTransport {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestAck, LedgerError> {
        let url = self.endpoint("add_transaction")?;
        debug!(
            %url,
            client = %request.client_id,
            value_bytes = request.encrypted_value.len(),
            context_bytes = request.context.len(),
            "sending transaction"
        );
        let form = Form::new()
            .text("client_id", String::from(request.client_id))
            .text("label", request.label.0)
            .part("value", binary_part(request.encrypted_value, "value.bin")?)
            .part("context", binary_part(request.context, "context.bin")?);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let ack: IngestAck = self.read_json(response).await?;
        if !ack.is_success() {
            return Err(LedgerError::Remote(format!(
                "cloud rejected transaction with status {:?}",
                ack.status
            )));
        }
        Ok(ack)
    }

    async fn aggregate(&self, client: &ClientId) -> Result<AggregateReply, LedgerError> {
        let url = self.endpoint("get_balance")?;
        debug!(%url, client = %client, "requesting aggregate");
        let response = self
            .client
            .post(url)
            .json(&BalanceRequest {
                client_id: client.clone(),
            })
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let envelope: BalanceEnvelope = self.read_json(response).await?;
        AggregateReply::from_envelope(&envelope)
            .map_err(|err| LedgerError::Remote(format!("malformed balance: {err}")))
    }
}
