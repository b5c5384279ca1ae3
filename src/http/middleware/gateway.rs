//! Admission middleware.
//! Runs identity, rate limiting and authentication in front of every gated
//! route and stamps the rate-limit headers on the way out.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::http::request::request_id;
use crate::http::response::apply_rate_limit_headers;
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn gateway_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    // Exempt paths skip admission entirely and carry no rate-limit headers.
    if state.exempt_paths.contains(request.uri().path()) {
        let response = run_bounded(next, request, state.request_timeout).await;
        metrics::record_request(&method, response.status().as_u16(), start);
        return response;
    }

    let origin = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let response = match state.gateway.admit(request.headers(), origin) {
        Ok(ctx) => {
            let decision = ctx.decision().copied();
            if let Some(client) = ctx.client() {
                request.extensions_mut().insert(client.clone());
            }

            let mut response = run_bounded(next, request, state.request_timeout).await;
            if let Some(decision) = decision {
                apply_rate_limit_headers(response.headers_mut(), &decision);
            }
            response
        }
        Err(rejection) => {
            tracing::debug!(
                request_id = %request_id(request.headers()),
                path = %request.uri().path(),
                status = rejection.error.status_code(),
                "Request rejected at admission"
            );
            let mut response = rejection.error.into_response();
            if let Some(decision) = rejection.decision {
                apply_rate_limit_headers(response.headers_mut(), &decision);
            }
            response
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}

/// Run the rest of the stack, turning an expired budget into a 500 envelope.
async fn run_bounded(next: Next, request: Request<Body>, budget: Duration) -> Response {
    let request_id = request_id(request.headers()).to_string();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(
                request_id = %request_id,
                path = %path,
                budget_secs = budget.as_secs(),
                "Request timed out"
            );
            GatewayError::Internal(format!("request exceeded {}s budget", budget.as_secs()))
                .into_response()
        }
    }
}
