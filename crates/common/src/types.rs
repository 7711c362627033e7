//! Common data types for the live session sync core.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque per-connection client identifier assigned by the carrier runtime.
///
/// Client identifiers are unique among currently-connected peers but not
/// stable across reconnects. The derived ordering is lexicographic, which
/// the freshness rule relies on to break timestamp ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// View the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity of a container runtime.
///
/// Keys the process-wide synchronizer registry: all live objects attached
/// to the same container share one synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub Uuid);

impl ContainerId {
    /// Create a new random container ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Meeting-level authorization label attached to the user behind a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Scheduled the session and controls it end to end.
    Organizer,
    /// Currently allowed to drive shared content.
    Presenter,
    /// Regular authenticated participant.
    Attendee,
    /// Anonymous or external participant.
    Guest,
}

impl Role {
    /// Returns the role as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Organizer => "organizer",
            Role::Presenter => "presenter",
            Role::Attendee => "attendee",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_lexicographic_order() {
        let a = ClientId::from("A");
        let b = ClientId::from("B");
        assert!(a < b);
        assert!(ClientId::from("client-10") < ClientId::from("client-9"));
    }

    #[test]
    fn test_client_id_serde_transparent() {
        let id = ClientId::from("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_container_id_unique() {
        assert_ne!(ContainerId::new(), ContainerId::new());
    }

    #[test]
    fn test_role_as_str() {
        assert_eq!(Role::Organizer.as_str(), "organizer");
        assert_eq!(Role::Presenter.as_str(), "presenter");
        assert_eq!(Role::Attendee.as_str(), "attendee");
        assert_eq!(Role::Guest.as_str(), "guest");
    }

    #[test]
    fn test_role_serde_roundtrip() {
        for role in [Role::Organizer, Role::Presenter, Role::Attendee, Role::Guest] {
            let json = serde_json::to_string(&role).unwrap();
            let back: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(back, role);
        }
    }
}
