//! Client identity resolution.
//!
//! The resolved [`ClientKey`] partitions rate-limit windows and tags audit
//! records. It is not an authentication result: the API key value is used
//! as-is, authenticity is checked later by the gateway if configured.

use std::fmt;
use std::net::IpAddr;

use axum::http::HeaderMap;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Stable per-caller identifier. Derived per request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ClientKey> for String {
    fn from(key: ClientKey) -> Self {
        key.0
    }
}

/// Read the API key header, treating blank or non-UTF-8 values as absent.
pub fn api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Derive the client key: `key:<api key>` when one is sent, else
/// `addr:<origin ip>`.
pub fn resolve_client_key(headers: &HeaderMap, origin: Option<IpAddr>) -> ClientKey {
    match api_key(headers) {
        Some(key) => ClientKey(format!("key:{key}")),
        None => match origin {
            Some(ip) => ClientKey(format!("addr:{ip}")),
            None => ClientKey("addr:unknown".to_string()),
        },
    }
}
