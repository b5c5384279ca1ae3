//! Live permission checks on validated paths.
//!
//! Nothing here is cached: permissions are external mutable state and are
//! queried from the OS on every call.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::security::path::SafePath;

/// Access mode requested on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionGrant {
    Read,
    Write,
    Delete,
}

/// Access mode requested on a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryGrant {
    Read,
    Write,
    Create,
}

/// Kind of access asked of the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    fn as_str(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
        }
    }
}

/// Answers whether the process may access a path in a given way.
pub trait AccessCheck {
    fn can_access(&self, path: &Path, access: Access) -> bool;
}

/// Asks the operating system on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsAccess;

impl AccessCheck for OsAccess {
    fn can_access(&self, path: &Path, access: Access) -> bool {
        can_access(path, access)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermissionError {
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{path} is not a {expected}")]
    WrongKind { path: String, expected: &'static str },

    #[error("{mode} permission denied on {path}")]
    Denied { mode: &'static str, path: String },
}

impl PermissionError {
    fn denied(access: Access, path: &Path) -> Self {
        PermissionError::Denied {
            mode: access.as_str(),
            path: path.display().to_string(),
        }
    }
}

/// Verify the process holds `grant` on the file at `path`.
pub fn check(path: &SafePath, grant: PermissionGrant) -> Result<(), PermissionError> {
    check_with(&OsAccess, path, grant)
}

/// [`check`] with the access answers supplied by `os`.
pub fn check_with(
    os: &impl AccessCheck,
    path: &SafePath,
    grant: PermissionGrant,
) -> Result<(), PermissionError> {
    let target = path.as_path();
    let exists = target.exists();

    if exists && !target.is_file() {
        return Err(PermissionError::WrongKind {
            path: target.display().to_string(),
            expected: "file",
        });
    }

    match grant {
        PermissionGrant::Read => {
            require_exists(target, exists)?;
            require(os, target, Access::Read)
        }
        PermissionGrant::Write => {
            if exists {
                require(os, target, Access::Write)?;
            }
            require_parent_writable(os, target)
        }
        PermissionGrant::Delete => {
            require_exists(target, exists)?;
            require(os, target, Access::Write)?;
            let parent = target
                .parent()
                .ok_or_else(|| PermissionError::denied(Access::Write, target))?;
            require(os, parent, Access::Write)
        }
    }
}

/// Verify the process holds `grant` on the directory at `path`.
pub fn check_directory(path: &SafePath, grant: DirectoryGrant) -> Result<(), PermissionError> {
    check_directory_with(&OsAccess, path, grant)
}

/// [`check_directory`] with the access answers supplied by `os`.
pub fn check_directory_with(
    os: &impl AccessCheck,
    path: &SafePath,
    grant: DirectoryGrant,
) -> Result<(), PermissionError> {
    let target = path.as_path();

    let access = match grant {
        DirectoryGrant::Create => return require_parent_writable(os, target),
        DirectoryGrant::Read => Access::Read,
        DirectoryGrant::Write => Access::Write,
    };

    if !target.exists() {
        return Err(PermissionError::NotFound(target.display().to_string()));
    }
    if !target.is_dir() {
        return Err(PermissionError::WrongKind {
            path: target.display().to_string(),
            expected: "directory",
        });
    }

    require(os, target, access)
}

fn require_exists(target: &Path, exists: bool) -> Result<(), PermissionError> {
    if exists {
        Ok(())
    } else {
        Err(PermissionError::NotFound(target.display().to_string()))
    }
}

fn require(os: &impl AccessCheck, target: &Path, access: Access) -> Result<(), PermissionError> {
    if os.can_access(target, access) {
        Ok(())
    } else {
        Err(PermissionError::denied(access, target))
    }
}

/// The closest existing ancestor must be a writable directory; missing
/// intermediate directories are created by the operation itself.
fn require_parent_writable(os: &impl AccessCheck, target: &Path) -> Result<(), PermissionError> {
    let ancestor = target
        .ancestors()
        .skip(1)
        .find(|p| p.exists())
        .ok_or_else(|| PermissionError::NotFound(target.display().to_string()))?;

    if !ancestor.is_dir() {
        return Err(PermissionError::WrongKind {
            path: ancestor.display().to_string(),
            expected: "directory",
        });
    }
    require(os, ancestor, Access::Write)
}

#[cfg(unix)]
fn can_access(path: &Path, access: Access) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let mode = match access {
        Access::Read => libc::R_OK,
        Access::Write => libc::W_OK,
    };
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

#[cfg(not(unix))]
fn can_access(path: &Path, access: Access) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => match access {
            Access::Read => true,
            Access::Write => !meta.permissions().readonly(),
        },
        Err(_) => false,
    }
}
