//! Caller identity resolution
//!
//! Authentication itself happens upstream; the checkout core only needs the
//! resolved user id of the caller, or nothing.

use http::HeaderMap;
use std::fmt;

/// Opaque id of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait IdentityProvider: Send + Sync {
    fn resolve_caller(&self, headers: &HeaderMap) -> Option<CallerId>;
}

/// Reads the caller id from a header set by the authenticating proxy
#[derive(Debug, Clone)]
pub struct HeaderIdentityProvider {
    header: String,
}

impl HeaderIdentityProvider {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_ascii_lowercase(),
        }
    }
}

impl IdentityProvider for HeaderIdentityProvider {
    fn resolve_caller(&self, headers: &HeaderMap) -> Option<CallerId> {
        headers
            .get(self.header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(CallerId::new)
    }
}
