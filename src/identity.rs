use std::fmt;

use axum::http::{HeaderMap, HeaderName};

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session collaborator. Research only runs for a logged-in caller.
pub trait IdentityProvider: Send + Sync {
    fn authenticated_user(&self, headers: &HeaderMap) -> Option<UserId>;
}

/// Reads the user id from a header the session layer in front of us sets
/// after authenticating the caller.
pub struct HeaderIdentity {
    header: HeaderName,
}

impl HeaderIdentity {
    pub fn new(header: &str) -> Result<Self, ConfigError> {
        let header = HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())
            .map_err(|_| ConfigError::InvalidIdentityHeader)?;
        Ok(Self { header })
    }
}

impl IdentityProvider for HeaderIdentity {
    fn authenticated_user(&self, headers: &HeaderMap) -> Option<UserId> {
        let value = headers.get(&self.header)?.to_str().ok()?.trim();
        if value.is_empty() {
            None
        } else {
            Some(UserId(value.to_string()))
        }
    }
}
