//! Data models for the meeting service.
//!
//! Persistent records (`Meeting`, `ParticipantRecord`) plus the request and
//! response bodies of the HTTP surface. The room password is only ever held
//! as a bcrypt hash and is never serialized.

use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{MeetingId, RoomId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a meeting title.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of a meeting description.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

// ============================================================================
// Meeting
// ============================================================================

/// Meeting lifecycle status.
///
/// Transitions: `scheduled -> active -> ended`, or `scheduled -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl MeetingStatus {
    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Active => "active",
            MeetingStatus::Ended => "ended",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    /// True once no further joins may succeed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, MeetingStatus::Ended | MeetingStatus::Cancelled)
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MeetingStatus::Scheduled),
            "active" => Ok(MeetingStatus::Active),
            "ended" => Ok(MeetingStatus::Ended),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            other => Err(format!("unknown meeting status '{other}'")),
        }
    }
}

/// Per-meeting settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSettings {
    /// Live participant limit.
    pub max_participants: u32,
    /// Whether in-room chat is allowed.
    pub allow_chat: bool,
    /// Whether participants may share their screen.
    pub allow_screen_share: bool,
}

impl MeetingSettings {
    /// Settings with the given participant limit and everything else enabled.
    #[must_use]
    pub const fn with_limit(max_participants: u32) -> Self {
        Self {
            max_participants,
            allow_chat: true,
            allow_screen_share: true,
        }
    }
}

/// Persistent meeting record.
#[derive(Debug, Clone)]
pub struct Meeting {
    pub meeting_id: MeetingId,
    pub title: String,
    pub description: Option<String>,
    pub creator_identity: String,
    pub host_identity: String,
    pub status: MeetingStatus,
    pub settings: MeetingSettings,
    /// bcrypt hash of the room password, if one is set.
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Meeting {
    /// Live room identifier for this meeting.
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.meeting_id.room_id()
    }

    /// Whether joining requires a password.
    #[must_use]
    pub fn requires_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Client-safe snapshot (no password material).
    #[must_use]
    pub fn snapshot(&self) -> MeetingSnapshot {
        MeetingSnapshot {
            meeting_id: self.meeting_id.clone(),
            room_id: self.room_id(),
            title: self.title.clone(),
            description: self.description.clone(),
            host_identity: self.host_identity.clone(),
            status: self.status,
            settings: self.settings,
            requires_password: self.requires_password(),
            created_at: self.created_at,
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }

    /// Public view with computed joinability.
    #[must_use]
    pub fn info(&self, current_participants: u32) -> MeetingInfoResponse {
        let is_full = current_participants >= self.settings.max_participants;
        MeetingInfoResponse {
            meeting_id: self.meeting_id.clone(),
            room_id: self.room_id(),
            title: self.title.clone(),
            description: self.description.clone(),
            host_identity: self.host_identity.clone(),
            status: self.status,
            max_participants: self.settings.max_participants,
            current_participants,
            requires_password: self.requires_password(),
            allow_chat: self.settings.allow_chat,
            allow_screen_share: self.settings.allow_screen_share,
            is_joinable: !self.status.is_closed() && !is_full,
            is_full,
        }
    }
}

/// Client-safe meeting snapshot returned on join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSnapshot {
    pub meeting_id: MeetingId,
    pub room_id: RoomId,
    pub title: String,
    pub description: Option<String>,
    pub host_identity: String,
    pub status: MeetingStatus,
    pub settings: MeetingSettings,
    pub requires_password: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Roster
// ============================================================================

/// Role of a participant within a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Moderator,
    Participant,
}

impl ParticipantRole {
    /// Database/wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Host => "host",
            ParticipantRole::Moderator => "moderator",
            ParticipantRole::Participant => "participant",
        }
    }
}

impl FromStr for ParticipantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(ParticipantRole::Host),
            "moderator" => Ok(ParticipantRole::Moderator),
            "participant" => Ok(ParticipantRole::Participant),
            other => Err(format!("unknown participant role '{other}'")),
        }
    }
}

/// Roster entry. One identity may have several records across rejoins but
/// at most one active record at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub identity: String,
    pub display_name: String,
    pub email: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub role: ParticipantRole,
    pub is_active: bool,
}

/// Input to `record_join`.
#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub identity: String,
    pub display_name: String,
    pub email: String,
}

/// Input to `create_meeting`.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub title: String,
    pub description: Option<String>,
    pub creator_identity: String,
    pub settings: MeetingSettings,
    /// Already-hashed room password.
    pub password_hash: Option<String>,
}

// ============================================================================
// HTTP bodies
// ============================================================================

/// Optional settings supplied on creation; missing fields take service defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSettingsInput {
    pub max_participants: Option<u32>,
    pub allow_chat: Option<bool>,
    pub allow_screen_share: Option<bool>,
}

/// Request body for `POST /api/v1/meetings`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub creator_identity: String,
    #[serde(default)]
    pub settings: Option<MeetingSettingsInput>,
    #[serde(default)]
    pub password: Option<SecretString>,
}

impl CreateMeetingRequest {
    /// Validate free-text fields.
    ///
    /// # Errors
    ///
    /// Returns a client-safe message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err("title must not be empty".to_string());
        }
        if title.chars().count() > MAX_TITLE_LENGTH {
            return Err(format!("title must be at most {MAX_TITLE_LENGTH} characters"));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(format!(
                    "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
                ));
            }
        }
        Ok(())
    }
}

/// Response body for `POST /api/v1/meetings`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingResponse {
    pub meeting_id: MeetingId,
    pub room_id: RoomId,
}

/// Response body for `GET /api/v1/meetings/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInfoResponse {
    pub meeting_id: MeetingId,
    pub room_id: RoomId,
    pub title: String,
    pub description: Option<String>,
    pub host_identity: String,
    pub status: MeetingStatus,
    pub max_participants: u32,
    pub current_participants: u32,
    pub requires_password: bool,
    pub allow_chat: bool,
    pub allow_screen_share: bool,
    pub is_joinable: bool,
    pub is_full: bool,
}

/// Request body for `POST /api/v1/meetings/{id}/join`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMeetingRequest {
    pub identity: String,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: Option<SecretString>,
}

/// Response body for a successful join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMeetingResponse {
    pub room_id: RoomId,
    pub meeting: MeetingSnapshot,
    pub participant: ParticipantRecord,
}

/// Request body for leave.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveMeetingRequest {
    pub identity: String,
}

/// Request body for host-only actions (end, cancel).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostActionRequest {
    pub requester_identity: String,
}

/// Query string for `GET /api/v1/meetings/{id}/chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatHistoryQuery {
    pub limit: Option<usize>,
}

/// Readiness probe response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<&'static str>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn meeting(status: MeetingStatus, max: u32) -> Meeting {
        Meeting {
            meeting_id: MeetingId::new("aB3dE5gH7jK9"),
            title: "Study group".to_string(),
            description: None,
            creator_identity: "hostaaaaaaaaaaaaaaaaaaaa".to_string(),
            host_identity: "hostaaaaaaaaaaaaaaaaaaaa".to_string(),
            status,
            settings: MeetingSettings::with_limit(max),
            password_hash: Some("$2b$04$hash".to_string()),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            MeetingStatus::Scheduled,
            MeetingStatus::Active,
            MeetingStatus::Ended,
            MeetingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<MeetingStatus>().unwrap(), status);
        }
        assert!("paused".parse::<MeetingStatus>().is_err());
    }

    #[test]
    fn test_info_computes_joinability() {
        let info = meeting(MeetingStatus::Active, 2).info(1);
        assert!(info.is_joinable);
        assert!(!info.is_full);

        let info = meeting(MeetingStatus::Active, 2).info(2);
        assert!(!info.is_joinable);
        assert!(info.is_full);

        let info = meeting(MeetingStatus::Ended, 2).info(0);
        assert!(!info.is_joinable);
        assert!(!info.is_full);
    }

    #[test]
    fn test_public_views_never_include_password() {
        let m = meeting(MeetingStatus::Scheduled, 6);

        let snapshot = serde_json::to_string(&m.snapshot()).unwrap();
        assert!(!snapshot.contains("$2b$"));
        assert!(snapshot.contains("\"requiresPassword\":true"));

        let info = serde_json::to_string(&m.info(0)).unwrap();
        assert!(!info.contains("$2b$"));
        assert!(info.contains("\"maxParticipants\":6"));
    }

    #[test]
    fn test_create_request_validation() {
        let mut req: CreateMeetingRequest = serde_json::from_str(
            r#"{"title": "  ", "creatorIdentity": "hostaaaaaaaaaaaaaaaaaaaa"}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());

        req.title = "Algebra review".to_string();
        assert!(req.validate().is_ok());

        req.title = "x".repeat(MAX_TITLE_LENGTH + 1);
        assert!(req.validate().is_err());
    }
}
