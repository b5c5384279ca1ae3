//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request id, tracing, body limit, panics)
//! - Put the gateway middleware in front of every route, including the
//!   fallbacks, so every failure leaves as an error envelope
//! - Bind server to listener and drain on shutdown

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderName,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewaySettings;
use crate::gateway::{Gateway, StartupError};
use crate::http::handlers;
use crate::http::middleware::gateway_middleware;
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::http::response::panic_response;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub exempt_paths: Arc<HashSet<String>>,
    /// Budget for one request, body read included.
    pub request_timeout: Duration,
}

/// HTTP front end of the gateway.
pub struct HttpServer {
    router: Router,
    settings: GatewaySettings,
}

impl HttpServer {
    /// Build the gateway from `settings` and wire up the router.
    pub fn new(settings: GatewaySettings) -> Result<Self, StartupError> {
        let gateway = Arc::new(Gateway::from_settings(&settings)?);
        Ok(Self::with_gateway(settings, gateway))
    }

    /// Serve an already constructed gateway.
    pub fn with_gateway(settings: GatewaySettings, gateway: Arc<Gateway>) -> Self {
        let state = AppState {
            gateway,
            exempt_paths: Arc::new(settings.limiter.exempt_paths.iter().cloned().collect()),
            request_timeout: Duration::from_secs(settings.timeouts.request_secs),
        };

        let router = Self::build_router(&settings, state);
        Self { router, settings }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(settings: &GatewaySettings, state: AppState) -> Router {
        let request_id_header = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .route("/health", get(handlers::health))
            .route("/fs/read", post(handlers::read))
            .route("/fs/copy", post(handlers::copy))
            .route("/fs/move", post(handlers::move_))
            .route("/fs/delete", post(handlers::delete))
            .route("/fs/list", post(handlers::list))
            .route("/fs/mkdir", post(handlers::mkdir))
            .route("/fs/search", post(handlers::search))
            .fallback(handlers::not_found)
            .method_not_allowed_fallback(handlers::method_not_allowed)
            .layer(DefaultBodyLimit::max(settings.listener.max_body_bytes))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                gateway_middleware,
            ))
            .with_state(state)
            .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id_header, UuidRequestId))
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            safe_base_dir = %self.settings.gateway.safe_base_dir.display(),
            limit = self.settings.gateway.limit,
            window_secs = self.settings.gateway.window_secs,
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server(dir: &tempfile::TempDir, limit: u32) -> HttpServer {
        let mut settings = GatewaySettings::default();
        settings.gateway.safe_base_dir = dir.path().to_path_buf();
        settings.gateway.limit = limit;
        HttpServer::new(settings).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_exempt() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(&dir, 1).router();

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(Request::get("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get("x-ratelimit-limit").is_none());
            assert!(response.headers().get(X_REQUEST_ID).is_some());
        }
    }

    #[tokio::test]
    async fn test_read_through_router() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();
        let app = server(&dir, 10).router();

        let response = app
            .oneshot(post_json("/fs/read", r#"{"path":"hello.txt"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["content"], "hi there");
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(&dir, 10).router();

        let response = app
            .oneshot(post_json("/fs/read", "{not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Validation error");
    }

    async fn envelope(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_oversized_body_is_validation_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(&dir, 10).router();
        let padding = "x".repeat(70 * 1024);
        let body = format!(r#"{{"path":"{padding}"}}"#);

        let response = app.oneshot(post_json("/fs/read", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");

        let json = envelope(response).await;
        assert_eq!(json["error"], "Validation error");
        assert_eq!(json["status_code"], 400);
    }

    #[tokio::test]
    async fn test_stalled_body_times_out_with_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = GatewaySettings::default();
        settings.gateway.safe_base_dir = dir.path().to_path_buf();
        settings.timeouts.request_secs = 1;
        let app = HttpServer::new(settings).unwrap().router();

        let stalled = futures_util::stream::pending::<Result<axum::body::Bytes, std::io::Error>>();
        let request = Request::post("/fs/read")
            .header("content-type", "application/json")
            .body(Body::from_stream(stalled))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get("x-ratelimit-limit").is_some());

        let json = envelope(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["detail"], crate::error::INTERNAL_DETAIL);
    }

    #[tokio::test]
    async fn test_wrong_method_is_validation_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(&dir, 10).router();

        let response = app
            .oneshot(Request::get("/fs/read").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get("x-ratelimit-limit").is_some());

        let json = envelope(response).await;
        assert_eq!(json["error"], "Validation error");
        assert_eq!(json["detail"], "Method GET is not supported on /fs/read");
    }

    #[tokio::test]
    async fn test_search_route() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes/meeting-minutes.txt"), "").unwrap();
        let app = server(&dir, 10).router();

        let response = app
            .oneshot(post_json("/fs/search", r#"{"path":".","pattern":"minutes"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = envelope(response).await;
        assert_eq!(json["truncated"], false);
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_route_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = server(&dir, 10).router();

        let response = app
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Resource not found");
        assert_eq!(json["status_code"], 404);
    }
}
