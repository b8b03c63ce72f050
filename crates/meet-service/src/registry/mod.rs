//! Meeting Registry: the persistent record of meetings, rosters and chat.
//!
//! The registry is the source of truth across process restarts. Live room
//! state never reads from it; the admission path and the room actors write
//! through it.
//!
//! Two implementations are provided:
//! - [`postgres::PgMeetingRegistry`] - production store (sqlx/PostgreSQL)
//! - [`memory::InMemoryMeetingRegistry`] - single-process store for local runs and tests

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMeetingRegistry;
pub use postgres::PgMeetingRegistry;

use crate::chat::ChatMessage;
use crate::models::{
    Meeting, MeetingInfoResponse, NewMeeting, NewParticipant, ParticipantRecord, ParticipantRole,
};

use async_trait::async_trait;
use common::types::MeetingId;
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

/// Meeting code length (base62 characters).
pub const MEETING_CODE_LENGTH: usize = 12;

/// Random bytes behind a meeting code (72 bits of entropy).
const MEETING_CODE_RANDOM_BYTES: usize = 9;

/// Base62 alphabet for meeting codes.
const BASE62_CHARS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Registry-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Meeting does not exist.
    #[error("Meeting not found: {0}")]
    NotFound(String),

    /// Meeting is ended or cancelled.
    #[error("Meeting already ended")]
    AlreadyEnded,

    /// Requester lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Active roster is at `max_participants`.
    #[error("Meeting is full")]
    Full,

    /// Operation not valid in the meeting's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store unreachable or failed.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RegistryError {
    fn from(err: sqlx::Error) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

/// Persistent meeting store.
#[async_trait]
pub trait MeetingRegistry: Send + Sync {
    /// Persist a new meeting with status `scheduled`. The creator becomes host.
    async fn create_meeting(&self, new_meeting: NewMeeting) -> Result<Meeting, RegistryError>;

    /// Fetch the full meeting record (including password hash).
    async fn get_meeting(&self, meeting_id: &MeetingId) -> Result<Meeting, RegistryError>;

    /// Number of active roster entries.
    async fn active_participant_count(&self, meeting_id: &MeetingId)
        -> Result<u32, RegistryError>;

    /// Whether `identity` currently holds an active roster entry.
    async fn is_active_participant(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<bool, RegistryError>;

    /// Append or reactivate a roster entry; `scheduled -> active` on first join.
    ///
    /// Capacity is enforced under the same lock as the insert, so concurrent
    /// joins never exceed `max_participants`. A rejoin of an active identity
    /// is always accepted.
    async fn record_join(
        &self,
        meeting_id: &MeetingId,
        participant: NewParticipant,
    ) -> Result<ParticipantRecord, RegistryError>;

    /// Mark the identity's active entry inactive. Idempotent.
    async fn record_leave(&self, meeting_id: &MeetingId, identity: &str)
        -> Result<(), RegistryError>;

    /// Host-only: `active -> ended`, closing every active roster entry.
    async fn end_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError>;

    /// Host-only: `scheduled -> cancelled`.
    async fn cancel_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError>;

    /// Full roster history, oldest first.
    async fn roster(&self, meeting_id: &MeetingId)
        -> Result<Vec<ParticipantRecord>, RegistryError>;

    /// Durably store one chat line.
    async fn persist_chat_message(
        &self,
        meeting_id: &MeetingId,
        message: &ChatMessage,
    ) -> Result<(), RegistryError>;

    /// Persisted chat, newest first, truncated to `limit`.
    async fn get_chat_history(
        &self,
        meeting_id: &MeetingId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RegistryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RegistryError>;

    /// Public view of a meeting with computed joinability.
    async fn get_meeting_info(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<MeetingInfoResponse, RegistryError> {
        let meeting = self.get_meeting(meeting_id).await?;
        let current = self.active_participant_count(meeting_id).await?;
        Ok(meeting.info(current))
    }
}

/// Role assigned to a joining identity.
#[must_use]
pub fn role_for(meeting: &Meeting, identity: &str) -> ParticipantRole {
    if meeting.host_identity == identity {
        ParticipantRole::Host
    } else {
        ParticipantRole::Participant
    }
}

/// Check that `requester` may perform a host-only action on `meeting`.
///
/// # Errors
///
/// Returns [`RegistryError::Forbidden`] for non-hosts.
pub fn ensure_host(meeting: &Meeting, requester: &str) -> Result<(), RegistryError> {
    if meeting.host_identity == requester {
        Ok(())
    } else {
        Err(RegistryError::Forbidden(
            "Only the host can perform this action".to_string(),
        ))
    }
}

/// Generate a 12-character base62 meeting code from a CSPRNG.
///
/// # Errors
///
/// Returns [`RegistryError::Unavailable`] if the system RNG fails.
pub fn generate_meeting_code() -> Result<MeetingId, RegistryError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; MEETING_CODE_RANDOM_BYTES];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "meet.registry", error = %e, "Failed to generate random bytes for meeting code");
        RegistryError::Unavailable("RNG failure".to_string())
    })?;

    let mut value: u128 = 0;
    for &b in &bytes {
        value = (value << 8) | u128::from(b);
    }

    // Least-significant digit first, reversed below
    let mut code = Vec::with_capacity(MEETING_CODE_LENGTH);
    for _ in 0..MEETING_CODE_LENGTH {
        let idx = usize::try_from(value % 62)
            .map_err(|_| RegistryError::Unavailable("Base62 index overflow".to_string()))?;
        let ch = BASE62_CHARS
            .get(idx)
            .ok_or_else(|| RegistryError::Unavailable("Base62 index out of range".to_string()))?;
        code.push(*ch);
        value /= 62;
    }
    code.reverse();

    String::from_utf8(code)
        .map(MeetingId)
        .map_err(|_| RegistryError::Unavailable("Meeting code contained invalid UTF-8".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_meeting_code_shape() {
        let code = generate_meeting_code().unwrap();
        assert_eq!(code.as_str().len(), MEETING_CODE_LENGTH);
        assert!(code.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_meeting_codes_are_unique() {
        let codes: HashSet<_> = (0..1_000)
            .map(|_| generate_meeting_code().unwrap())
            .collect();
        assert_eq!(codes.len(), 1_000);
    }
}
