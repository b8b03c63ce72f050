//! In-process meeting registry.
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suite.
//! State lives behind a single `RwLock`; it stands in for the database and
//! is never touched by room actors except through the write-behind paths.

use super::{ensure_host, generate_meeting_code, role_for, MeetingRegistry, RegistryError};
use crate::chat::ChatMessage;
use crate::models::{Meeting, MeetingStatus, NewMeeting, NewParticipant, ParticipantRecord};

use async_trait::async_trait;
use chrono::Utc;
use common::types::MeetingId;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct MeetingEntry {
    meeting: Meeting,
    roster: Vec<ParticipantRecord>,
    chat: Vec<ChatMessage>,
}

/// In-memory [`MeetingRegistry`].
#[derive(Debug, Default)]
pub struct InMemoryMeetingRegistry {
    meetings: RwLock<HashMap<MeetingId, MeetingEntry>>,
}

impl InMemoryMeetingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(meeting_id: &MeetingId) -> RegistryError {
    RegistryError::NotFound(meeting_id.to_string())
}

#[async_trait]
impl MeetingRegistry for InMemoryMeetingRegistry {
    async fn create_meeting(&self, new_meeting: NewMeeting) -> Result<Meeting, RegistryError> {
        let mut meetings = self.meetings.write().await;

        let mut meeting_id = generate_meeting_code()?;
        while meetings.contains_key(&meeting_id) {
            meeting_id = generate_meeting_code()?;
        }

        let meeting = Meeting {
            meeting_id: meeting_id.clone(),
            title: new_meeting.title,
            description: new_meeting.description,
            host_identity: new_meeting.creator_identity.clone(),
            creator_identity: new_meeting.creator_identity,
            status: MeetingStatus::Scheduled,
            settings: new_meeting.settings,
            password_hash: new_meeting.password_hash,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };

        meetings.insert(
            meeting_id,
            MeetingEntry {
                meeting: meeting.clone(),
                roster: Vec::new(),
                chat: Vec::new(),
            },
        );

        Ok(meeting)
    }

    async fn get_meeting(&self, meeting_id: &MeetingId) -> Result<Meeting, RegistryError> {
        let meetings = self.meetings.read().await;
        meetings
            .get(meeting_id)
            .map(|entry| entry.meeting.clone())
            .ok_or_else(|| not_found(meeting_id))
    }

    async fn active_participant_count(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<u32, RegistryError> {
        let meetings = self.meetings.read().await;
        let entry = meetings.get(meeting_id).ok_or_else(|| not_found(meeting_id))?;
        let count = entry.roster.iter().filter(|r| r.is_active).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn is_active_participant(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<bool, RegistryError> {
        let meetings = self.meetings.read().await;
        let entry = meetings.get(meeting_id).ok_or_else(|| not_found(meeting_id))?;
        Ok(entry
            .roster
            .iter()
            .any(|r| r.is_active && r.identity == identity))
    }

    async fn record_join(
        &self,
        meeting_id: &MeetingId,
        participant: NewParticipant,
    ) -> Result<ParticipantRecord, RegistryError> {
        let mut meetings = self.meetings.write().await;
        let entry = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| not_found(meeting_id))?;

        if entry.meeting.status.is_closed() {
            return Err(RegistryError::AlreadyEnded);
        }

        if entry.meeting.status == MeetingStatus::Scheduled {
            entry.meeting.status = MeetingStatus::Active;
            entry.meeting.started_at = Some(Utc::now());
        }

        // Rejoin while still active: refresh the existing entry
        if let Some(existing) = entry
            .roster
            .iter_mut()
            .find(|r| r.is_active && r.identity == participant.identity)
        {
            existing.display_name = participant.display_name;
            existing.email = participant.email;
            return Ok(existing.clone());
        }

        let active = entry.roster.iter().filter(|r| r.is_active).count();
        if u32::try_from(active).unwrap_or(u32::MAX) >= entry.meeting.settings.max_participants {
            return Err(RegistryError::Full);
        }

        let record = ParticipantRecord {
            role: role_for(&entry.meeting, &participant.identity),
            identity: participant.identity,
            display_name: participant.display_name,
            email: participant.email,
            joined_at: Utc::now(),
            left_at: None,
            is_active: true,
        };
        entry.roster.push(record.clone());

        Ok(record)
    }

    async fn record_leave(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<(), RegistryError> {
        let mut meetings = self.meetings.write().await;
        let entry = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| not_found(meeting_id))?;

        let now = Utc::now();
        for record in entry
            .roster
            .iter_mut()
            .filter(|r| r.is_active && r.identity == identity)
        {
            record.is_active = false;
            record.left_at = Some(now);
        }

        Ok(())
    }

    async fn end_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError> {
        let mut meetings = self.meetings.write().await;
        let entry = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| not_found(meeting_id))?;

        ensure_host(&entry.meeting, requester_identity)?;

        match entry.meeting.status {
            MeetingStatus::Ended | MeetingStatus::Cancelled => {
                return Err(RegistryError::AlreadyEnded)
            }
            MeetingStatus::Scheduled => {
                return Err(RegistryError::Conflict(
                    "Meeting has not started; cancel it instead".to_string(),
                ))
            }
            MeetingStatus::Active => {}
        }

        let now = Utc::now();
        entry.meeting.status = MeetingStatus::Ended;
        entry.meeting.ended_at = Some(now);
        for record in entry.roster.iter_mut().filter(|r| r.is_active) {
            record.is_active = false;
            record.left_at = Some(now);
        }

        Ok(entry.meeting.clone())
    }

    async fn cancel_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError> {
        let mut meetings = self.meetings.write().await;
        let entry = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| not_found(meeting_id))?;

        ensure_host(&entry.meeting, requester_identity)?;

        match entry.meeting.status {
            MeetingStatus::Ended | MeetingStatus::Cancelled => {
                return Err(RegistryError::AlreadyEnded)
            }
            MeetingStatus::Active => {
                return Err(RegistryError::Conflict(
                    "Meeting is in progress; end it instead".to_string(),
                ))
            }
            MeetingStatus::Scheduled => {}
        }

        entry.meeting.status = MeetingStatus::Cancelled;
        entry.meeting.ended_at = Some(Utc::now());

        Ok(entry.meeting.clone())
    }

    async fn roster(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<Vec<ParticipantRecord>, RegistryError> {
        let meetings = self.meetings.read().await;
        meetings
            .get(meeting_id)
            .map(|entry| entry.roster.clone())
            .ok_or_else(|| not_found(meeting_id))
    }

    async fn persist_chat_message(
        &self,
        meeting_id: &MeetingId,
        message: &ChatMessage,
    ) -> Result<(), RegistryError> {
        let mut meetings = self.meetings.write().await;
        let entry = meetings
            .get_mut(meeting_id)
            .ok_or_else(|| not_found(meeting_id))?;
        entry.chat.push(message.clone());
        Ok(())
    }

    async fn get_chat_history(
        &self,
        meeting_id: &MeetingId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RegistryError> {
        let meetings = self.meetings.read().await;
        let entry = meetings.get(meeting_id).ok_or_else(|| not_found(meeting_id))?;
        Ok(entry.chat.iter().rev().take(limit).cloned().collect())
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        Ok(())
    }
}
