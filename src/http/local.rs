use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use super::{with_common_layers, ApiError, ApiJson};
use crate::client::LocalLedgerClient;
use crate::error::LedgerError;
use crate::wire::{BalanceRequest, DepositRequest, IngestAck, LocalBalanceResponse};

/// `POST /add_transaction` and `POST /get_balance`, both JSON.
pub fn local_router(client: LocalLedgerClient) -> Router {
    let router = Router::new()
        .route("/add_transaction", post(add_transaction))
        .route("/get_balance", post(get_balance))
        .with_state(client);
    with_common_layers(router)
}

async fn add_transaction(
    State(client): State<LocalLedgerClient>,
    ApiJson(request): ApiJson<DepositRequest>,
) -> Result<Json<IngestAck>, ApiError> {
    let ack = client
        .deposit(&request.client_id, &request.label, request.value)
        .await?;
    Ok(Json(ack))
}

async fn get_balance(
    State(client): State<LocalLedgerClient>,
    ApiJson(request): ApiJson<BalanceRequest>,
) -> Result<Json<LocalBalanceResponse>, ApiError> {
    match client.get_balance(&request.client_id).await {
        Ok(balance) => Ok(Json(LocalBalanceResponse::balance(balance))),
        Err(LedgerError::NoTransactions(_)) => Ok(Json(LocalBalanceResponse::no_transactions())),
        Err(err) => Err(err.into()),
    }
}
