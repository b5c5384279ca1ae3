//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or built-in defaults
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewaySettings (validated, immutable)
//!     → passed by reference into the gateway at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuditConfig, AuthConfig, GatewayConfig, GatewaySettings, LimiterConfig, ListenerConfig,
    LogFormat, ObservabilityConfig, OperationsConfig, TimeoutConfig,
};
pub use validation::validate_config;
