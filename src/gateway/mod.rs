//! Gateway core.
//!
//! # Data Flow
//! ```text
//! Received
//!     → IdentityResolved (security::identity)
//!     → RateChecked      (security::rate_limit)
//!     → Authenticated    (optional API key)
//! filesystem operations only:
//!     → PathValidated    (security::path)
//!     → PermissionChecked(security::permissions)
//!     → Audited          (audit)
//!     → Executed
//! any step may stop the request; the response is then an error::ErrorEnvelope
//! ```
//!
//! Each step is a plain method taking and returning a context value; see
//! `pipeline.rs`. The gateway owns no hidden global state: the rate limiter
//! and audit log are injected at construction.

pub mod context;
pub mod pipeline;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use context::{Denial, FsContext, Rejection, RequestContext, Stage};

use crate::audit::AuditLog;
use crate::config::{GatewayConfig, GatewaySettings, OperationsConfig};
use crate::security::{PathSecurityError, PathValidator, RateLimiter};

/// Failures while assembling the gateway at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("gateway.window_secs must be greater than zero")]
    ZeroWindow,

    #[error("invalid safe base directory: {0}")]
    BaseDir(#[from] PathSecurityError),

    #[error("cannot open audit sink: {0}")]
    Audit(#[from] io::Error),
}

/// Admission, path confinement and auditing for every request.
pub struct Gateway {
    config: GatewayConfig,
    limiter: Arc<RateLimiter>,
    validator: PathValidator,
    audit: AuditLog,
    api_key: Option<String>,
    operations: Arc<OperationsConfig>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        limiter: Arc<RateLimiter>,
        audit: AuditLog,
    ) -> Result<Self, StartupError> {
        if config.window_secs == 0 {
            return Err(StartupError::ZeroWindow);
        }
        let validator = PathValidator::new(&config.safe_base_dir)?;

        Ok(Self {
            config,
            limiter,
            validator,
            audit,
            api_key: None,
            operations: Arc::new(OperationsConfig::default()),
        })
    }

    /// Build the gateway and its collaborators from loaded settings.
    pub fn from_settings(settings: &GatewaySettings) -> Result<Self, StartupError> {
        let limiter = Arc::new(RateLimiter::new(settings.limiter.max_tracked_clients));
        let audit = AuditLog::from_config(&settings.audit)?;

        Ok(Self::new(settings.gateway.clone(), limiter, audit)?
            .with_api_key(settings.auth.api_key.clone())
            .with_operations(settings.operations.clone()))
    }

    /// Require this key in `X-API-Key` on every gated request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    /// Limits and the delete backup directory for filesystem operations.
    pub fn with_operations(mut self, operations: OperationsConfig) -> Self {
        self.operations = Arc::new(operations);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }
}
