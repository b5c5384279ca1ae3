//! Axum middleware.

pub mod gateway;

pub use gateway::gateway_middleware;
