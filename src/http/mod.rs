//! HTTP surface of both services.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRequest};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{debug, warn};

use crate::error::{ErrorKind, LedgerError};
use crate::wire::ErrorBody;

pub mod cloud;
pub mod local;

pub use cloud::cloud_router;
pub use local::local_router;

/// Upper bound on request bodies; a ciphertext at the largest ring degree
/// stays well below it.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// [`LedgerError`] rendered as a JSON error body with a matching status.
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(LedgerError::InvalidInput(rejection.body_text()))
    }
}

/// `Json` extractor whose rejections use the [`ApiError`] body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::UnknownClient(_) | LedgerError::NoTransactions(_) => StatusCode::NOT_FOUND,
            LedgerError::Remote(_) => StatusCode::BAD_GATEWAY,
            LedgerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            other if other.kind() == ErrorKind::Rejected => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self.0, "request failed");
        } else {
            debug!(%status, error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: self.0.kind().as_str().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn with_common_layers(router: Router) -> Router {
    router.layer(DefaultBodyLimit::max(MAX_BODY_BYTES)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().include_headers(false))
            .on_response(DefaultOnResponse::new().include_headers(false)),
    )
}

/// Serves `router` until ctrl-c or SIGTERM.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
