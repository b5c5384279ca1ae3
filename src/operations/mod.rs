//! Filesystem operations guarded by the gateway.
//!
//! # Data Flow
//! ```text
//! FsRequest (raw client paths)
//!     → gateway pipeline validates paths and checks permissions
//!     → fs.rs executes against the SafePaths
//!     → FsOutput (serialized by the HTTP handlers)
//! ```

pub mod fs;

use glob::Pattern;
use serde::Serialize;

use crate::audit::OperationKind;
use crate::error::GatewayError;
use crate::security::{DirectoryGrant, PermissionGrant};

/// A requested filesystem operation with its raw, unvalidated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsRequest {
    Read { path: String },
    Copy { source: String, destination: String },
    Move { source: String, destination: String },
    Delete { path: String },
    List { path: String },
    Mkdir { path: String },
    Search { path: String, pattern: String },
}

/// Access a validated path must grant before the operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    File(PermissionGrant),
    Directory(DirectoryGrant),
}

impl FsRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            FsRequest::Read { .. } => OperationKind::Read,
            FsRequest::Copy { .. } => OperationKind::Copy,
            FsRequest::Move { .. } => OperationKind::Move,
            FsRequest::Delete { .. } => OperationKind::Delete,
            FsRequest::List { .. } => OperationKind::List,
            FsRequest::Mkdir { .. } => OperationKind::Mkdir,
            FsRequest::Search { .. } => OperationKind::Search,
        }
    }

    /// The primary path (the source for two-path operations).
    pub fn raw_path(&self) -> &str {
        match self {
            FsRequest::Read { path }
            | FsRequest::Delete { path }
            | FsRequest::List { path }
            | FsRequest::Mkdir { path }
            | FsRequest::Search { path, .. } => path,
            FsRequest::Copy { source, .. } | FsRequest::Move { source, .. } => source,
        }
    }

    pub fn raw_destination(&self) -> Option<&str> {
        match self {
            FsRequest::Copy { destination, .. } | FsRequest::Move { destination, .. } => {
                Some(destination)
            }
            _ => None,
        }
    }

    /// What the primary path must grant.
    pub fn requirement(&self) -> Requirement {
        match self {
            FsRequest::Read { .. } | FsRequest::Copy { .. } => {
                Requirement::File(PermissionGrant::Read)
            }
            FsRequest::Move { .. } | FsRequest::Delete { .. } => {
                Requirement::File(PermissionGrant::Delete)
            }
            FsRequest::List { .. } | FsRequest::Search { .. } => {
                Requirement::Directory(DirectoryGrant::Read)
            }
            FsRequest::Mkdir { .. } => Requirement::Directory(DirectoryGrant::Create),
        }
    }

    /// Check arguments that are not paths. Runs before anything is audited
    /// as allowed.
    pub fn check_arguments(&self) -> Result<(), GatewayError> {
        match self {
            FsRequest::Search { pattern, .. } => search_pattern(pattern).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// What the destination path must grant, for two-path operations.
    pub fn destination_requirement(&self) -> Option<Requirement> {
        self.raw_destination()
            .map(|_| Requirement::File(PermissionGrant::Write))
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// One listed directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// Result of a completed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FsOutput {
    Content {
        path: String,
        content: String,
    },
    Entries {
        path: String,
        entries: Vec<DirEntryInfo>,
    },
    Matches {
        path: String,
        pattern: String,
        matches: Vec<String>,
        truncated: bool,
    },
    Done {
        operation: OperationKind,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        destination: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        backup: Option<String>,
    },
}

/// Compile a search pattern. A bare name matches anywhere in an entry name;
/// patterns with wildcards are used as given. Patterns never span
/// directories.
pub fn search_pattern(raw: &str) -> Result<Pattern, GatewayError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::Validation(
            "search pattern cannot be empty".to_string(),
        ));
    }
    if trimmed.contains(['/', '\\', '\0']) {
        return Err(GatewayError::Validation(
            "search pattern must be a file name, not a path".to_string(),
        ));
    }

    let glob = if trimmed.contains(['*', '?', '[']) {
        trimmed.to_string()
    } else {
        format!("*{}*", Pattern::escape(trimmed))
    };
    Pattern::new(&glob)
        .map_err(|e| GatewayError::Validation(format!("invalid search pattern: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_matches_anywhere() {
        let pattern = search_pattern("report").unwrap();
        assert!(pattern.matches("q1-report-final.txt"));
        assert!(pattern.matches("report"));
        assert!(!pattern.matches("rep0rt.txt"));
    }

    #[test]
    fn test_wildcard_pattern_used_verbatim() {
        let pattern = search_pattern("*.log").unwrap();
        assert!(pattern.matches("server.log"));
        assert!(!pattern.matches("server.log.gz"));
    }

    #[test]
    fn test_literal_brackets_escaped_in_bare_names() {
        let pattern = search_pattern("draft(1)").unwrap();
        assert!(pattern.matches("my draft(1).doc"));
    }

    #[test]
    fn test_bad_patterns_rejected() {
        for raw in ["", "   ", "a/b", "..\\x", "[unclosed"] {
            let err = search_pattern(raw).unwrap_err();
            assert_eq!(err.status_code(), 400, "{raw:?}");
        }
    }

    #[test]
    fn test_search_requires_directory_read() {
        let request = FsRequest::Search {
            path: ".".into(),
            pattern: "x".into(),
        };
        assert_eq!(request.kind(), OperationKind::Search);
        assert_eq!(
            request.requirement(),
            Requirement::Directory(DirectoryGrant::Read)
        );
        assert!(request.destination_requirement().is_none());
        assert!(request.check_arguments().is_ok());
    }
}
