use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The chat-surface identity of the process owner, e.g. a Discord user id.
/// Trusted once at startup (see `warden_core::config::OwnerConfig`); every
/// inbound message is checked against it and anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque 8-character id shared by routines, reminders, webhooks and
/// inquiries. Short enough to type on a CLI, long enough that collisions
/// within a single directory are vanishingly unlikely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShortId(pub String);

impl ShortId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ShortId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ShortId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ShortId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque session identifier handed back by the agent SDK. The core never
/// interprets its contents, only persists and compares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_eight_chars() {
        let id = ShortId::new();
        assert_eq!(id.as_str().len(), 8);
    }

    #[test]
    fn short_id_roundtrips_through_display() {
        let id = ShortId::from("abcd1234");
        assert_eq!(id.to_string(), "abcd1234");
    }
}
