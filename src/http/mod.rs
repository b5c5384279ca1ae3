//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower layers: request id, trace, timeout, body limit)
//!     → middleware/gateway.rs (exempt paths, admission, rate-limit headers)
//!     → handlers.rs (decode JSON, run the guarded filesystem operation)
//!     → response.rs (error envelope, headers)
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
