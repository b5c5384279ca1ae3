//! Operations Gateway Library
//!
//! A security layer in front of filesystem operations: every request is
//! identified, rate limited and optionally authenticated; every path is
//! confined to one base directory and checked against live permissions;
//! every attempt is audited.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ http::middleware::gateway ──▶ http::handlers
//!                                          │                            │
//!                                          ▼                            ▼
//!                                   gateway::admit              gateway::execute_fs
//!                                   (security::identity,        (security::path,
//!                                    security::rate_limit,       security::permissions,
//!                                    api key)                    audit, operations::fs)
//!
//!     Cross-cutting: config, error, observability, lifecycle
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod operations;
pub mod security;

pub use config::schema::GatewaySettings;
pub use error::{ErrorEnvelope, ErrorKind, GatewayError};
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
