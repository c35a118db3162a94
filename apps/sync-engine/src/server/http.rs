//! HTTP/JSON API server implementation.
//!
//! A small REST surface over the sync service: a health probe and the sync
//! trigger. Reports and account management stay in the journal frontend.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::application::sync::{SyncMode, SyncRequest, SyncService, SyncSummary};
use crate::error::SyncError;
use crate::infrastructure::broker::schwab::{SchwabBrokerageAdapter, SchwabCredentialProvider};
use crate::infrastructure::persistence::InMemoryJournalStore;

/// The sync service wiring the server runs against.
pub type WiredSyncService = SyncService<
    SchwabBrokerageAdapter,
    SchwabCredentialProvider<InMemoryJournalStore>,
    InMemoryJournalStore,
>;

/// Shared state for the HTTP server.
#[derive(Clone)]
pub struct SyncServer {
    service: Arc<WiredSyncService>,
}

impl SyncServer {
    /// Create a new sync server.
    #[must_use]
    pub fn new(service: WiredSyncService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Create the Axum router with all endpoints.
#[must_use]
pub fn create_router(server: SyncServer) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/sync", post(run_sync))
        .with_state(server)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

/// Request to trigger a sync. Fields are optional at the wire level so
/// missing ones surface as a 400 with a field name instead of a decode error.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunSyncRequest {
    /// Account to sync.
    pub account_id: Option<String>,
    /// Reach-back mode: `recent` or `all`.
    pub mode: Option<SyncMode>,
}

/// Response from a sync run.
#[derive(Debug, Serialize)]
pub struct RunSyncResponse {
    /// Account that was synced.
    pub account_id: String,
    /// Mode that ran.
    pub mode: SyncMode,
    /// Outcome counters.
    #[serde(flatten)]
    pub summary: SyncSummary,
}

/// Sync trigger endpoint.
async fn run_sync(
    State(server): State<SyncServer>,
    Json(req): Json<RunSyncRequest>,
) -> Result<Json<RunSyncResponse>, ApiError> {
    let account_id = req
        .account_id
        .ok_or_else(|| ApiError::bad_request("missing field: account_id"))?;
    let mode = req
        .mode
        .ok_or_else(|| ApiError::bad_request("missing field: mode"))?;

    tracing::info!(account_id = %account_id, ?mode, "Sync requested");

    let request = SyncRequest { account_id, mode };
    let summary = server.service.sync(&request).await?;

    Ok(Json(RunSyncResponse {
        account_id: request.account_id,
        mode: request.mode,
        summary,
    }))
}

/// API error wrapper carrying the engine error taxonomy.
#[derive(Debug)]
pub struct ApiError(SyncError);

impl ApiError {
    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(SyncError::Validation(message.into()))
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        Self(error)
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Stable error category.
    error: &'static str,
    /// Human-readable details.
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, category) = match &self.0 {
            SyncError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth"),
            SyncError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream"),
            SyncError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            SyncError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
        };

        let body = ErrorBody {
            error: category,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sync::SyncConfig;
    use crate::infrastructure::broker::schwab::{RetryConfig, SchwabConfig};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_server() -> SyncServer {
        let config = SchwabConfig::new("client".to_string(), "secret".to_string())
            .with_retry(RetryConfig::no_retries());
        let store = Arc::new(InMemoryJournalStore::new());
        let broker = Arc::new(SchwabBrokerageAdapter::new(&config).unwrap());
        let credentials = Arc::new(SchwabCredentialProvider::new(store.clone(), &config).unwrap());
        let service = SyncService::new(broker, credentials, store, SyncConfig::default());

        SyncServer::new(service)
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let app = create_router(make_server());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn sync_without_account_id_is_bad_request() {
        let app = create_router(make_server());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sync")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"mode":"recent"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sync_without_mode_is_bad_request() {
        let app = create_router(make_server());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sync")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"account_id":"acct-1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn sync_for_unknown_account_is_bad_request() {
        let app = create_router(make_server());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/sync")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"account_id":"nope","mode":"recent"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
