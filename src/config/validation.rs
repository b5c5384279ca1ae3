//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (window > 0, timeouts > 0)
//! - Check the safe base directory and audit file location exist
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function of config + filesystem metadata
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::GatewaySettings;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("gateway.window_secs must be greater than zero")]
    ZeroWindow,

    #[error("gateway.safe_base_dir must be absolute: {0}")]
    RelativeBaseDir(String),

    #[error("gateway.safe_base_dir is not an existing directory: {0}")]
    MissingBaseDir(String),

    #[error("listener.bind_address is not a socket address: {0}")]
    BadBindAddress(String),

    #[error("observability.metrics_address is not a socket address: {0}")]
    BadMetricsAddress(String),

    #[error("limiter.max_tracked_clients must be greater than zero")]
    ZeroClientCapacity,

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroTimeout,

    #[error("audit.file parent directory does not exist: {0}")]
    MissingAuditDir(String),

    #[error("operations.max_search_results must be greater than zero")]
    ZeroSearchResults,

    #[error("operations.delete_backup_dir must be absolute: {0}")]
    RelativeBackupDir(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &GatewaySettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.gateway.window_secs == 0 {
        errors.push(ValidationError::ZeroWindow);
    }

    let base = &config.gateway.safe_base_dir;
    if !base.is_absolute() {
        errors.push(ValidationError::RelativeBaseDir(base.display().to_string()));
    } else if !base.is_dir() {
        errors.push(ValidationError::MissingBaseDir(base.display().to_string()));
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::BadMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.limiter.max_tracked_clients == 0 {
        errors.push(ValidationError::ZeroClientCapacity);
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    if let Some(file) = &config.audit.file {
        let parent_ok = match file.parent() {
            Some(p) if p.as_os_str().is_empty() => true,
            Some(p) => p.is_dir(),
            None => false,
        };
        if !parent_ok {
            errors.push(ValidationError::MissingAuditDir(file.display().to_string()));
        }
    }

    if config.operations.max_search_results == 0 {
        errors.push(ValidationError::ZeroSearchResults);
    }

    if let Some(dir) = &config.operations.delete_backup_dir {
        if !dir.is_absolute() {
            errors.push(ValidationError::RelativeBackupDir(dir.display().to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
