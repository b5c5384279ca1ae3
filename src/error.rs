//! Error taxonomy and the external error envelope.
//!
//! Every failure produced by the gateway is a [`GatewayError`], and every
//! `GatewayError` belongs to exactly one [`ErrorKind`]. The mapping from kind
//! to status code and category is fixed; [`ErrorEnvelope::map`] is the only
//! way an envelope is built.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::{PathSecurityError, PermissionError};

/// Detail shown to callers for every 500-class failure.
pub const INTERNAL_DETAIL: &str = "Internal server error";

/// The closed set of externally visible failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authentication,
    PermissionDenied,
    NotFound,
    RateLimit,
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Authentication => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimit => 429,
            ErrorKind::Internal => 500,
        }
    }

    /// Category string placed in the envelope's `error` field.
    pub fn category(self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation error",
            ErrorKind::Authentication => "Authentication required",
            ErrorKind::PermissionDenied => "Permission denied",
            ErrorKind::NotFound => "Resource not found",
            ErrorKind::RateLimit => "Rate limit exceeded",
            ErrorKind::Internal => "Internal server error",
        }
    }

    /// Whether the specific message may be shown to the caller.
    pub fn is_client_error(self) -> bool {
        self.status_code() < 500
    }
}

/// Failures raised anywhere in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed or unsafe input, including rejected paths.
    #[error("{0}")]
    Validation(String),

    /// A required client credential is missing.
    #[error("{0}")]
    Authentication(String),

    /// The credential or the filesystem does not grant the requested access.
    #[error("{0}")]
    PermissionDenied(String),

    /// The referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The client's rate-limit window is exhausted.
    #[error("Maximum {limit} requests per {window_secs} seconds")]
    RateLimited {
        limit: u32,
        window_secs: u64,
        retry_after_secs: u64,
    },

    /// A persistence collaborator failed.
    #[error("database error: {0}")]
    Database(String),

    /// Any other fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Authentication(_) => ErrorKind::Authentication,
            GatewayError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::RateLimited { .. } => ErrorKind::RateLimit,
            GatewayError::Database(_) | GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::NotFound => GatewayError::NotFound(err.to_string()),
            Io::PermissionDenied => GatewayError::PermissionDenied(err.to_string()),
            Io::AlreadyExists => GatewayError::Validation(err.to_string()),
            _ => GatewayError::Internal(err.to_string()),
        }
    }
}

impl From<PathSecurityError> for GatewayError {
    fn from(err: PathSecurityError) -> Self {
        match err {
            PathSecurityError::InvalidBase(_) => GatewayError::Internal(err.to_string()),
            _ => GatewayError::Validation(err.to_string()),
        }
    }
}

impl From<PermissionError> for GatewayError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::NotFound(_) => GatewayError::NotFound(err.to_string()),
            PermissionError::WrongKind { .. } => GatewayError::Validation(err.to_string()),
            PermissionError::Denied { .. } => GatewayError::PermissionDenied(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::Internal(format!("operation task failed: {err}"))
    }
}

/// Externally stable failure body: `{"error", "detail", "status_code"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    error: String,
    detail: String,
    status_code: u16,
}

impl ErrorEnvelope {
    /// Map a failure to its envelope. Internal messages never reach `detail`
    /// for 500-class failures.
    pub fn map(err: &GatewayError) -> Self {
        let kind = err.kind();
        let detail = if kind.is_client_error() {
            err.to_string()
        } else {
            INTERNAL_DETAIL.to_string()
        };
        Self {
            error: kind.category().to_string(),
            detail,
            status_code: kind.status_code(),
        }
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

impl From<&GatewayError> for ErrorEnvelope {
    fn from(err: &GatewayError) -> Self {
        Self::map(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        let cases = [
            (GatewayError::Validation("bad".into()), 400),
            (GatewayError::Authentication("who".into()), 401),
            (GatewayError::PermissionDenied("no".into()), 403),
            (GatewayError::NotFound("gone".into()), 404),
            (
                GatewayError::RateLimited {
                    limit: 1,
                    window_secs: 60,
                    retry_after_secs: 10,
                },
                429,
            ),
            (GatewayError::Database("locked".into()), 500),
            (GatewayError::Internal("boom".into()), 500),
        ];

        for (err, status) in cases {
            let envelope = ErrorEnvelope::map(&err);
            assert_eq!(envelope.status_code(), status, "{err:?}");
            assert_eq!(envelope.error(), err.kind().category());
        }
    }

    #[test]
    fn test_client_errors_keep_message() {
        let envelope = ErrorEnvelope::map(&GatewayError::NotFound("note 7 not found".into()));
        assert_eq!(envelope.detail(), "note 7 not found");
    }

    #[test]
    fn test_internal_detail_is_generic() {
        let err = GatewayError::Internal("disk controller on fire at /dev/sda".into());
        let envelope = ErrorEnvelope::map(&err);

        assert_eq!(envelope.status_code(), 500);
        assert_eq!(envelope.detail(), INTERNAL_DETAIL);

        let db = ErrorEnvelope::map(&GatewayError::Database("password=hunter2".into()));
        assert_eq!(db.detail(), INTERNAL_DETAIL);
    }

    #[test]
    fn test_rate_limit_envelope() {
        let err = GatewayError::RateLimited {
            limit: 100,
            window_secs: 60,
            retry_after_secs: 42,
        };
        let json = serde_json::to_value(ErrorEnvelope::map(&err)).unwrap();

        assert_eq!(json["error"], "Rate limit exceeded");
        assert_eq!(json["detail"], "Maximum 100 requests per 60 seconds");
        assert_eq!(json["status_code"], 429);
    }

    #[test]
    fn test_io_errors_map_by_kind() {
        use std::io::{Error, ErrorKind as Io};

        let not_found: GatewayError = Error::new(Io::NotFound, "x").into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        let denied: GatewayError = Error::new(Io::PermissionDenied, "x").into();
        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);

        let exists: GatewayError = Error::new(Io::AlreadyExists, "x").into();
        assert_eq!(exists.kind(), ErrorKind::Validation);

        let other: GatewayError = Error::new(Io::Other, "x").into();
        assert_eq!(other.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_path_rejection_is_validation() {
        let err: GatewayError = PathSecurityError::Traversal.into();
        let envelope = ErrorEnvelope::map(&err);

        assert_eq!(envelope.status_code(), 400);
        assert_eq!(envelope.detail(), "path contains a parent-directory segment");
    }

    #[test]
    fn test_permission_errors_map() {
        let denied: GatewayError = PermissionError::Denied {
            mode: "write",
            path: "/data/a".into(),
        }
        .into();
        assert_eq!(denied.status_code(), 403);

        let missing: GatewayError = PermissionError::NotFound("/data/a".into()).into();
        assert_eq!(missing.status_code(), 404);

        let kind: GatewayError = PermissionError::WrongKind {
            path: "/data".into(),
            expected: "file",
        }
        .into();
        assert_eq!(kind.status_code(), 400);
    }

    #[tokio::test]
    async fn test_panicked_task_is_internal() {
        let join_err = tokio::spawn(async { panic!("secret internals") })
            .await
            .unwrap_err();
        let envelope = ErrorEnvelope::map(&GatewayError::from(join_err));

        assert_eq!(envelope.status_code(), 500);
        assert_eq!(envelope.detail(), INTERNAL_DETAIL);
    }
}
