//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewaySettings {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Admission and path-confinement settings.
    pub gateway: GatewayConfig,

    /// Optional API key enforcement.
    pub auth: AuthConfig,

    /// Rate-limit window store settings.
    pub limiter: LimiterConfig,

    /// Audit sink settings.
    pub audit: AuditConfig,

    /// Limits applied to the guarded filesystem operations.
    pub operations: OperationsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8000").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Core gateway configuration, built once at startup and shared read-only.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Requests admitted per client per window.
    pub limit: u32,

    /// Fixed window length in seconds. Must be positive.
    pub window_secs: u64,

    /// Root every filesystem path is confined to.
    pub safe_base_dir: PathBuf,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            window_secs: 60,
            safe_base_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// API key enforcement.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// When set, gated routes require a matching `X-API-Key` header.
    pub api_key: Option<String>,
}

/// Rate-limit window store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Upper bound on tracked client windows before eviction kicks in.
    pub max_tracked_clients: usize,

    /// Request paths that bypass admission entirely.
    pub exempt_paths: Vec<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_tracked_clients: 10_000,
            exempt_paths: vec!["/health".to_string()],
        }
    }
}

/// Audit sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines file to append records to. Records go to the structured
    /// log when unset.
    pub file: Option<PathBuf>,
}

/// Limits for guarded filesystem operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OperationsConfig {
    /// Largest file `read` will return, in bytes.
    pub max_read_bytes: u64,

    /// Most matches a single `search` returns.
    pub max_search_results: usize,

    /// Deleted files are copied here first. No backup is kept when unset.
    pub delete_backup_dir: Option<PathBuf>,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            max_read_bytes: 1024 * 1024,
            max_search_results: 10,
            delete_backup_dir: None,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
