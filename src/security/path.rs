//! Path confinement for filesystem operations.
//!
//! A [`SafePath`] can only be produced by [`PathValidator::validate`], which
//! rejects malformed input on the raw string first and then proves the
//! canonical result lies inside the configured base directory.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Longest raw path accepted, in characters.
pub const MAX_PATH_LEN: usize = 4096;

/// Reasons a raw path is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSecurityError {
    #[error("path cannot be empty")]
    Empty,

    #[error("path is {len} characters long, maximum is {max}")]
    TooLong { len: usize, max: usize },

    #[error("path contains a null byte")]
    NullByte,

    #[error("path contains a parent-directory segment")]
    Traversal,

    #[error("path contains control characters")]
    ControlCharacter,

    #[error("path cannot be resolved: {0}")]
    Unresolvable(String),

    #[error("path resolves outside the allowed directory: {0}")]
    OutsideBase(String),

    #[error("safe base directory is unusable: {0}")]
    InvalidBase(String),
}

impl PathSecurityError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            PathSecurityError::Empty => "empty",
            PathSecurityError::TooLong { .. } => "too_long",
            PathSecurityError::NullByte => "null_byte",
            PathSecurityError::Traversal => "traversal",
            PathSecurityError::ControlCharacter => "control_character",
            PathSecurityError::Unresolvable(_) => "unresolvable",
            PathSecurityError::OutsideBase(_) => "outside_base",
            PathSecurityError::InvalidBase(_) => "invalid_base",
        }
    }
}

/// An absolute, canonical path confined to the safe base directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafePath(PathBuf);

impl SafePath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for SafePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for SafePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Validates raw paths against one canonical base directory.
#[derive(Debug, Clone)]
pub struct PathValidator {
    base: PathBuf,
}

impl PathValidator {
    /// Canonicalize `base` once; it must be an existing directory.
    pub fn new(base: &Path) -> Result<Self, PathSecurityError> {
        let base = base
            .canonicalize()
            .map_err(|e| PathSecurityError::InvalidBase(format!("{}: {e}", base.display())))?;
        if !base.is_dir() {
            return Err(PathSecurityError::InvalidBase(format!(
                "{} is not a directory",
                base.display()
            )));
        }
        Ok(Self { base })
    }

    /// The canonical base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Validate `raw`, short-circuiting on the first violation.
    pub fn validate(&self, raw: &str) -> Result<SafePath, PathSecurityError> {
        if raw.is_empty() {
            return Err(PathSecurityError::Empty);
        }
        let len = raw.chars().count();
        if len > MAX_PATH_LEN {
            return Err(PathSecurityError::TooLong {
                len,
                max: MAX_PATH_LEN,
            });
        }
        if raw.contains('\0') {
            return Err(PathSecurityError::NullByte);
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathSecurityError::Empty);
        }

        // Checked on the raw text: normalization would hide these.
        if trimmed.split(['/', '\\']).any(is_parent_segment) {
            return Err(PathSecurityError::Traversal);
        }
        if trimmed.chars().any(is_control) {
            return Err(PathSecurityError::ControlCharacter);
        }

        let candidate = Path::new(trimmed);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        };

        let resolved = canonicalize_lenient(&joined)?;
        if !resolved.starts_with(&self.base) {
            return Err(PathSecurityError::OutsideBase(trimmed.to_string()));
        }

        Ok(SafePath(resolved))
    }
}

/// One-shot validation against `base`.
pub fn validate(raw: &str, base: &Path) -> Result<SafePath, PathSecurityError> {
    PathValidator::new(base)?.validate(raw)
}

fn is_parent_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == ".."
}

fn is_control(c: char) -> bool {
    (c as u32) < 0x20 || c == '\u{7f}'
}

/// Canonicalize the longest existing prefix of `path` and append the
/// remaining components. A dangling symlink in the tail is refused since
/// writing through it would land wherever it points.
fn canonicalize_lenient(path: &Path) -> Result<PathBuf, PathSecurityError> {
    let mut existing = path;
    let mut tail: Vec<&OsStr> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut canonical) => {
                for part in tail.iter().rev() {
                    canonical.push(part);
                }
                return Ok(canonical);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if existing.symlink_metadata().is_ok() {
                    return Err(PathSecurityError::Unresolvable(format!(
                        "{} is a dangling symbolic link",
                        existing.display()
                    )));
                }
                let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                    return Err(PathSecurityError::Unresolvable(err.to_string()));
                };
                tail.push(name);
                existing = parent;
            }
            Err(err) => return Err(PathSecurityError::Unresolvable(err.to_string())),
        }
    }
}
