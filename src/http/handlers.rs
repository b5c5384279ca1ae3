//! Route handlers.
//!
//! Handlers only decode the body and hand a [`FsRequest`] to the gateway;
//! validation, permission checks and auditing live in the pipeline.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{Method, Uri},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::http::server::AppState;
use crate::operations::{FsOutput, FsRequest};
use crate::security::ClientKey;

/// Body for single-path operations.
#[derive(Debug, Deserialize)]
pub struct PathBody {
    pub path: String,
}

/// Body for copy and move.
#[derive(Debug, Deserialize)]
pub struct TransferBody {
    pub source: String,
    pub destination: String,
}

/// Body for search: a directory to search under and a name pattern.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub path: String,
    pub pattern: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

type FsResult = Result<Json<FsOutput>, GatewayError>;

pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn read(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    run(&state, client, FsRequest::Read { path: body.path }).await
}

pub async fn copy(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    let request = FsRequest::Copy {
        source: body.source,
        destination: body.destination,
    };
    run(&state, client, request).await
}

pub async fn move_(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<TransferBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    let request = FsRequest::Move {
        source: body.source,
        destination: body.destination,
    };
    run(&state, client, request).await
}

pub async fn delete(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    run(&state, client, FsRequest::Delete { path: body.path }).await
}

pub async fn list(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    run(&state, client, FsRequest::List { path: body.path }).await
}

pub async fn mkdir(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    run(&state, client, FsRequest::Mkdir { path: body.path }).await
}

pub async fn search(
    State(state): State<AppState>,
    client: Option<Extension<ClientKey>>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> FsResult {
    let Json(body) = body?;
    let request = FsRequest::Search {
        path: body.path,
        pattern: body.pattern,
    };
    run(&state, client, request).await
}

/// Fallback for unknown routes.
pub async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(format!("No route for {}", uri.path()))
}

/// Fallback for known routes called with the wrong method.
pub async fn method_not_allowed(method: Method, uri: Uri) -> GatewayError {
    GatewayError::Validation(format!(
        "Method {method} is not supported on {}",
        uri.path()
    ))
}

async fn run(
    state: &AppState,
    client: Option<Extension<ClientKey>>,
    request: FsRequest,
) -> FsResult {
    let Extension(client) = client.ok_or_else(|| {
        GatewayError::Internal("handler reached without passing admission".to_string())
    })?;

    state.gateway.execute_fs(&client, request).await.map(Json)
}
