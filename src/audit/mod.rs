//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! gateway pipeline (one record per filesystem attempt)
//!     → AuditLog::record
//!     → sink.rs (JSON-lines file, structured log, or memory)
//! ```
//!
//! # Design Decisions
//! - Recording never fails the guarded operation
//! - Sink errors are reported at warn level and counted, then dropped
//! - Denials are audited as well as allowed operations

pub mod record;
pub mod sink;

use std::io;
use std::sync::Arc;

pub use record::{AuditOutcome, AuditRecord, OperationKind};
pub use sink::{AuditSink, JsonLinesSink, MemorySink, TracingSink};

use crate::config::AuditConfig;
use crate::observability::metrics;

/// Append-only audit log shared by all requests.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Build the sink named by the configuration.
    pub fn from_config(config: &AuditConfig) -> io::Result<Self> {
        let sink: Arc<dyn AuditSink> = match &config.file {
            Some(path) => {
                tracing::info!(path = %path.display(), "Audit records go to file");
                Arc::new(JsonLinesSink::open(path)?)
            }
            None => Arc::new(TracingSink),
        };
        Ok(Self::new(sink))
    }

    /// Append `record`. Sink failures are logged and swallowed.
    pub fn record(&self, record: AuditRecord) {
        metrics::record_audit(record.outcome.as_str());
        if let Err(e) = self.sink.append(&record) {
            metrics::record_audit_failure();
            tracing::warn!(
                target: "audit",
                error = %e,
                client = %record.client_key,
                operation = %record.operation,
                outcome = record.outcome.as_str(),
                "Audit sink write failed"
            );
        }
    }
}
