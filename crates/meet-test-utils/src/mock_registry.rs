//! Registry double that can be switched offline.
//!
//! Wraps an [`InMemoryMeetingRegistry`]; while offline every call fails
//! with `RegistryError::Unavailable`, the way a lost database connection
//! surfaces through the PostgreSQL store. With interleaving on, every call
//! yields to the scheduler first, the way a network round trip would, so
//! concurrent callers interleave between reads and writes.
//!
//! # Example
//!
//! ```rust,ignore
//! let registry = Arc::new(SwitchableRegistry::new());
//! // create a meeting while online...
//! registry.set_available(false);
//! // ...then observe 503 PERSISTENCE_UNAVAILABLE from the API
//! ```

use async_trait::async_trait;
use common::types::MeetingId;
use meet_service::chat::ChatMessage;
use meet_service::models::{Meeting, NewMeeting, NewParticipant, ParticipantRecord};
use meet_service::registry::{InMemoryMeetingRegistry, MeetingRegistry, RegistryError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory registry with an availability switch.
#[derive(Debug)]
pub struct SwitchableRegistry {
    inner: InMemoryMeetingRegistry,
    available: AtomicBool,
    interleaving: AtomicBool,
    failed_calls: AtomicUsize,
}

impl Default for SwitchableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchableRegistry {
    /// An online registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: InMemoryMeetingRegistry::new(),
            available: AtomicBool::new(true),
            interleaving: AtomicBool::new(false),
            failed_calls: AtomicUsize::new(0),
        }
    }

    /// An online registry that yields before every call.
    #[must_use]
    pub fn interleaving() -> Self {
        let registry = Self::new();
        registry.interleaving.store(true, Ordering::SeqCst);
        registry
    }

    /// A registry that fails every call from the start.
    #[must_use]
    pub fn unavailable() -> Self {
        let registry = Self::new();
        registry.set_available(false);
        registry
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Calls rejected while offline.
    pub fn failed_calls(&self) -> usize {
        self.failed_calls.load(Ordering::SeqCst)
    }

    async fn check(&self) -> Result<(), RegistryError> {
        if self.interleaving.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            self.failed_calls.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::Unavailable(
                "connection refused".to_string(),
            ))
        }
    }
}

#[async_trait]
impl MeetingRegistry for SwitchableRegistry {
    async fn create_meeting(&self, new_meeting: NewMeeting) -> Result<Meeting, RegistryError> {
        self.check().await?;
        self.inner.create_meeting(new_meeting).await
    }

    async fn get_meeting(&self, meeting_id: &MeetingId) -> Result<Meeting, RegistryError> {
        self.check().await?;
        self.inner.get_meeting(meeting_id).await
    }

    async fn active_participant_count(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<u32, RegistryError> {
        self.check().await?;
        self.inner.active_participant_count(meeting_id).await
    }

    async fn is_active_participant(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<bool, RegistryError> {
        self.check().await?;
        self.inner.is_active_participant(meeting_id, identity).await
    }

    async fn record_join(
        &self,
        meeting_id: &MeetingId,
        participant: NewParticipant,
    ) -> Result<ParticipantRecord, RegistryError> {
        self.check().await?;
        self.inner.record_join(meeting_id, participant).await
    }

    async fn record_leave(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<(), RegistryError> {
        self.check().await?;
        self.inner.record_leave(meeting_id, identity).await
    }

    async fn end_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError> {
        self.check().await?;
        self.inner.end_meeting(meeting_id, requester_identity).await
    }

    async fn cancel_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError> {
        self.check().await?;
        self.inner.cancel_meeting(meeting_id, requester_identity).await
    }

    async fn roster(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<Vec<ParticipantRecord>, RegistryError> {
        self.check().await?;
        self.inner.roster(meeting_id).await
    }

    async fn persist_chat_message(
        &self,
        meeting_id: &MeetingId,
        message: &ChatMessage,
    ) -> Result<(), RegistryError> {
        self.check().await?;
        self.inner.persist_chat_message(meeting_id, message).await
    }

    async fn get_chat_history(
        &self,
        meeting_id: &MeetingId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RegistryError> {
        self.check().await?;
        self.inner.get_chat_history(meeting_id, limit).await
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.check().await?;
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_switch_toggles_availability() {
        let registry = SwitchableRegistry::new();
        assert!(registry.ping().await.is_ok());

        registry.set_available(false);
        assert!(matches!(
            registry.ping().await,
            Err(RegistryError::Unavailable(_))
        ));
        assert_eq!(registry.failed_calls(), 1);

        registry.set_available(true);
        assert!(registry.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_interleaving_still_delegates() {
        let registry = SwitchableRegistry::interleaving();
        assert!(registry.ping().await.is_ok());
        assert!(matches!(
            registry.get_meeting(&MeetingId::new("missing")).await,
            Err(RegistryError::NotFound(_))
        ));
    }
}
