use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// Name of a connected participant. Names are case-sensitive and the host
/// guarantees at most one live session per name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantName(pub String);

impl ParticipantName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ParticipantName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Ordered (requester, target) pair identifying one pending request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub requester: ParticipantName,
    pub target: ParticipantName,
}

impl RequestKey {
    pub fn new(requester: impl Into<ParticipantName>, target: impl Into<ParticipantName>) -> Self {
        Self {
            requester: requester.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=>{}", self.requester, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub dimension: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(dimension: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            dimension: dimension.into(),
            x,
            y,
            z,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.1}, {:.1}, {:.1})", self.dimension, self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuChoice {
    SendRequest,
    AcceptRequest,
}

/// Where a `tpa` command invocation came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOrigin {
    Participant(ParticipantName),
    Server,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_displays_requester_then_target() {
        let key = RequestKey::new("Alice", "Bob");
        assert_eq!(key.to_string(), "Alice=>Bob");
    }

    #[test]
    fn participant_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&ParticipantName::from("Alice")).expect("json");
        assert_eq!(json, "\"Alice\"");
    }
}
