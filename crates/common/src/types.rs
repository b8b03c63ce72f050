//! Common data types for Huddle components.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix that turns a meeting identifier into its live room identifier.
pub const ROOM_ID_PREFIX: &str = "room-";

/// Error returned when a room identifier does not follow the `room-<meeting>` shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed room identifier: {0}")]
pub struct MalformedRoomId(pub String);

/// Opaque short token identifying a persisted meeting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingId(pub String);

impl MeetingId {
    /// Wrap an existing meeting token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The live room identifier for this meeting.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        RoomId(format!("{ROOM_ID_PREFIX}{}", self.0))
    }
}

impl fmt::Display for MeetingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MeetingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identifier of a live room, derived deterministically from a [`MeetingId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Parse a client-supplied room identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRoomId`] when the prefix is missing or the meeting part is empty.
    pub fn parse(value: &str) -> Result<Self, MalformedRoomId> {
        match value.strip_prefix(ROOM_ID_PREFIX) {
            Some(rest) if !rest.is_empty() => Ok(Self(value.to_string())),
            _ => Err(MalformedRoomId(value.to_string())),
        }
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the meeting this room belongs to.
    #[must_use]
    pub fn meeting_id(&self) -> MeetingId {
        let raw = self.0.strip_prefix(ROOM_ID_PREFIX).unwrap_or(&self.0);
        MeetingId(raw.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_derived_from_meeting_id() {
        let meeting = MeetingId::new("aB3dE5gH7jK9");
        let room = meeting.room_id();

        assert_eq!(room.as_str(), "room-aB3dE5gH7jK9");
        assert_eq!(room.meeting_id(), meeting);
        // Same meeting always maps to the same room
        assert_eq!(meeting.room_id(), room);
    }

    #[test]
    fn test_room_id_parse_rejects_malformed() {
        assert!(RoomId::parse("room-abc").is_ok());
        assert_eq!(
            RoomId::parse("abc"),
            Err(MalformedRoomId("abc".to_string()))
        );
        assert!(RoomId::parse("room-").is_err());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let meeting = MeetingId::new("xyz");
        assert_eq!(serde_json::to_string(&meeting).unwrap(), "\"xyz\"");

        let room: RoomId = serde_json::from_str("\"room-xyz\"").unwrap();
        assert_eq!(room.meeting_id().as_str(), "xyz");
    }
}
