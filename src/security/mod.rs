//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → identity.rs (derive the client key)
//!     → rate_limit.rs (fixed-window admission per client)
//! Filesystem operations additionally:
//!     → path.rs (confine the raw path to the safe base directory)
//!     → permissions.rs (live access check on the validated path)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: validation and permission checks are separate steps
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod identity;
pub mod path;
pub mod permissions;
pub mod rate_limit;

pub use identity::{resolve_client_key, ClientKey, API_KEY_HEADER};
pub use path::{PathSecurityError, PathValidator, SafePath};
pub use permissions::{
    check, check_directory, check_directory_with, check_with, Access, AccessCheck, DirectoryGrant,
    OsAccess, PermissionError, PermissionGrant,
};
pub use rate_limit::{Decision, RateLimiter};
