use std::sync::Arc;

use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::debug;

use super::{with_common_layers, ApiError, ApiJson};
use crate::error::LedgerError;
use crate::run_blocking;
use crate::server::CloudLedgerServer;
use crate::types::{ClientId, Label};
use crate::wire::{BalanceEnvelope, BalanceRequest, IngestAck, IngestRequest};

/// `POST /add_transaction` (multipart) and `POST /get_balance` (JSON).
pub fn cloud_router(server: Arc<CloudLedgerServer>) -> Router {
    let router = Router::new()
        .route("/add_transaction", post(add_transaction))
        .route("/get_balance", post(get_balance))
        .with_state(server);
    with_common_layers(router)
}

fn bad_multipart(err: MultipartError) -> ApiError {
    ApiError(LedgerError::InvalidInput(format!("multipart body: {err}")))
}

fn missing(field: &str) -> ApiError {
    ApiError(LedgerError::InvalidInput(format!("missing multipart field {field:?}")))
}

async fn add_transaction(
    State(server): State<Arc<CloudLedgerServer>>,
    mut multipart: Multipart,
) -> Result<Json<IngestAck>, ApiError> {
    let mut client_id = None;
    let mut label = None;
    let mut value = None;
    let mut context = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "client_id" => client_id = Some(field.text().await.map_err(bad_multipart)?),
            "label" => label = Some(field.text().await.map_err(bad_multipart)?),
            "value" => value = Some(field.bytes().await.map_err(bad_multipart)?.to_vec()),
            "context" => context = Some(field.bytes().await.map_err(bad_multipart)?.to_vec()),
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let request = IngestRequest {
        client_id: ClientId::new(client_id.ok_or_else(|| missing("client_id"))?)
            .map_err(LedgerError::from)?,
        label: Label(label.unwrap_or_default()),
        encrypted_value: value.ok_or_else(|| missing("value"))?,
        context: context.ok_or_else(|| missing("context"))?,
    };
    let ack = run_blocking(move || server.ingest(&request)).await?;
    Ok(Json(ack))
}

async fn get_balance(
    State(server): State<Arc<CloudLedgerServer>>,
    ApiJson(request): ApiJson<BalanceRequest>,
) -> Result<Json<BalanceEnvelope>, ApiError> {
    let reply = run_blocking(move || server.aggregate_reply(&request.client_id)).await?;
    Ok(Json(reply.to_envelope()))
}
