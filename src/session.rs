//! Session identity attached to every outbound message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque client-generated session identifier.
///
/// Created once per [`crate::client::ChatClient`] and never regenerated for
/// the lifetime of that client, across any number of reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier of the form `session-<uuid v4>`.
    pub fn generate() -> Self {
        SessionId(format!("session-{}", uuid::Uuid::new_v4()))
    }

    /// Use an externally supplied identifier, or generate one when the value
    /// is missing or blank.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(id) if !id.is_empty() => SessionId(id.to_string()),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
