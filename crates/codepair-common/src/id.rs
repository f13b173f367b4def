use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Identifier of a paired session.
///
/// Built from the pairing code plus the record's creation time in epoch
/// milliseconds (`AB12-1700000000000`), so a code string that is reissued
/// after expiry never lands in the previous holder's session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn for_code(code: &str, created_at_millis: i64) -> Self {
        Self(format!("{code}-{created_at_millis}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The pairing code this session was opened with.
    pub fn code(&self) -> &str {
        match self.0.rsplit_once('-') {
            Some((code, _)) => code,
            None => &self.0,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle for a transport connection. The core only ever stores this
/// identifier, never the connection itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
