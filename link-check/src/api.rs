//! HTTP routes for the batch API.
//!
//! - `POST /links`: check a batch, answer with its statuses and batch ID
//! - `POST /links/batches`: look up previously recorded batches
//! - `GET /health`: current lifecycle state

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use link_check_lib::{
    BatchEntries, BatchId, BatchOutcome, LifecycleState, LinkCheckError, LinkChecker,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
pub struct LinksRequest {
    pub links: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchesRequest {
    pub links_list: Vec<BatchId>,
}

#[derive(Debug, Serialize)]
pub struct BatchesResponse {
    pub batches: BTreeMap<BatchId, BatchEntries>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: LifecycleState,
}

/// Build the router over a running checker.
pub fn router(checker: LinkChecker) -> Router {
    Router::new()
        .route("/links", post(check_links))
        .route("/links/batches", post(get_batches))
        .route("/health", get(health))
        .with_state(checker)
}

async fn check_links(
    State(checker): State<LinkChecker>,
    payload: Result<Json<LinksRequest>, JsonRejection>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let Json(request) = payload?;
    debug!(links = request.links.len(), "batch received");

    let outcome = checker.check_batch(&request.links).await?;
    Ok(Json(outcome))
}

async fn get_batches(
    State(checker): State<LinkChecker>,
    payload: Result<Json<BatchesRequest>, JsonRejection>,
) -> Result<Json<BatchesResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(BatchesResponse {
        batches: checker.get_batches(&request.links_list),
    }))
}

async fn health(State(checker): State<LinkChecker>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: checker.state(),
    })
}

/// Error response: `{"error": "<message>"}` with a matching status code.
#[derive(Debug)]
pub struct ApiError(pub LinkCheckError);

impl From<LinkCheckError> for ApiError {
    fn from(err: LinkCheckError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(LinkCheckError::invalid_request(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            LinkCheckError::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            LinkCheckError::PoolClosed => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string())
            }
            other => {
                // Storage and internal details stay in the log.
                error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
