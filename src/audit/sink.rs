//! Audit sinks.
//!
//! A sink receives fully built records and must make each one visible as a
//! whole: concurrent appends never interleave bytes of two records.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::audit::record::AuditRecord;

/// Append target for audit records.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> io::Result<()>;
}

/// Appends one JSON document per line to a file.
pub struct JsonLinesSink {
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonLinesSink {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record).map_err(io::Error::other)?;
        line.push(b'\n');

        let mut file = lock(&self.file);
        file.write_all(&line)?;
        file.flush()
    }
}

/// Emits records as structured events on the `audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        tracing::info!(
            target: "audit",
            timestamp_ms = record.timestamp_ms,
            client = %record.client_key,
            operation = %record.operation,
            raw_path = %record.raw_path,
            resolved_path = ?record.resolved_path,
            destination = ?record.destination,
            outcome = record.outcome.as_str(),
            reason = ?record.reason,
            "FILE_OPERATION"
        );
        Ok(())
    }
}

/// Keeps records in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, in insertion order.
    pub fn records(&self) -> Vec<AuditRecord> {
        lock(&self.records).clone()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        lock(&self.records).push(record.clone());
        Ok(())
    }
}

// A panic while holding the lock cannot leave a half-written record behind
// (each append is a single write), so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
