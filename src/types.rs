//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers and validation for type safety:
//! - `ConnId`: remote-address based connection identifier
//! - `validate_name`: display name rules for `/nick` and `/register`

use std::net::SocketAddr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;

/// Display names: 3-15 ASCII letters, digits, hyphens or periods
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.-]{3,15}$").expect("static name pattern"));

/// Unique connection identifier (newtype pattern)
///
/// Wraps the remote address string of a live TCP connection. It is the
/// registry key and the default display name of a fresh client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(String);

impl ConnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for ConnId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Check a display name against the naming rules
pub fn validate_name(name: &str) -> Result<(), AppError> {
    if NAME_PATTERN.is_match(name) {
        Ok(())
    } else {
        Err(AppError::InvalidName)
    }
}
