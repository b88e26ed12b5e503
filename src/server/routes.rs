//! HTTP surface of the control plane.
//!
//! - `GET /policy`: committed policy plus enforcement mode
//! - `POST /policy`: replace the policy (bearer token when configured)
//! - `GET /healthz`: liveness

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::EgressError;

use super::{PolicyServer, PolicySnapshot, WriteError, WriteStage};

/// Error body for every non-2xx `/policy` response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
    /// `null` when an abandoned nft run leaves the kernel state unknown
    pub kernel_applied: Option<bool>,
}

struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorResponse {
                code: "UNAUTHORIZED",
                message: "missing or invalid bearer token".to_string(),
                kernel_applied: Some(false),
            },
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(err: WriteError) -> Self {
        let (status, code) = match err.stage {
            WriteStage::Validate => (StatusCode::BAD_REQUEST, "INVALID_POLICY"),
            WriteStage::Apply => (StatusCode::INTERNAL_SERVER_ERROR, "APPLY_FAILED"),
            WriteStage::Commit => (StatusCode::INTERNAL_SERVER_ERROR, "COMMIT_FAILED"),
        };
        Self {
            status,
            body: ErrorResponse {
                code,
                message: err.to_string(),
                kernel_applied: err.kernel_applied,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn router(server: Arc<PolicyServer>) -> Router {
    Router::new()
        .route("/policy", get(get_policy).post(post_policy))
        .route("/healthz", get(healthz))
        .with_state(server)
}

/// Serve the control plane until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    server: Arc<PolicyServer>,
    shutdown: CancellationToken,
) -> Result<(), EgressError> {
    let app = router(server);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// GET /policy
async fn get_policy(State(server): State<Arc<PolicyServer>>) -> Json<PolicySnapshot> {
    Json(server.handle_read())
}

/// POST /policy
async fn post_policy(
    State(server): State<Arc<PolicyServer>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if !server.authorize(&headers) {
        log::warn!("Rejected unauthenticated policy update");
        return Err(ApiError::unauthorized());
    }

    let committed = server.handle_write(&body).await?;
    Ok(Json(committed.as_ref().clone()).into_response())
}

async fn healthz() -> &'static str {
    "ok"
}
