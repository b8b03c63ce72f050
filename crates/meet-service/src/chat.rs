//! In-room chat: bounded replay ring and write-behind persistence.
//!
//! Each live room owns one [`ChatRing`] holding the most recent messages for
//! replay to new joiners, and one [`ChatPersister`] that writes every message
//! to the registry in order on a background task. Broadcast to connected
//! peers never waits on the persister.

use crate::observability::metrics;
use crate::registry::MeetingRegistry;

use chrono::{DateTime, Utc};
use common::types::{MeetingId, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default number of messages kept for replay.
pub const DEFAULT_CHAT_BUFFER_CAPACITY: usize = 100;

/// Queue depth of the persistence writer before messages are dropped.
const PERSIST_CHANNEL_BUFFER: usize = 256;

/// Upper bound on how long teardown waits for pending writes.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Kind of chat line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// Sent by a participant.
    Text,
    /// Generated by the service (joins, leaves).
    System,
}

impl ChatKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Text => "text",
            ChatKind::System => "system",
        }
    }
}

/// A single chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: RoomId,
    pub sender_identity: String,
    pub sender_name: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ChatKind,
}

impl ChatMessage {
    /// A participant-authored message stamped now.
    #[must_use]
    pub fn text(room_id: RoomId, sender_identity: &str, sender_name: &str, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_identity: sender_identity.to_string(),
            sender_name: sender_name.to_string(),
            body,
            timestamp: Utc::now(),
            kind: ChatKind::Text,
        }
    }

    /// A service-generated notice about `subject_identity`.
    #[must_use]
    pub fn system(room_id: RoomId, subject_identity: &str, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_identity: subject_identity.to_string(),
            sender_name: "system".to_string(),
            body,
            timestamp: Utc::now(),
            kind: ChatKind::System,
        }
    }
}

/// Capacity-bounded FIFO of recent chat messages.
#[derive(Debug)]
pub struct ChatRing {
    capacity: usize,
    messages: VecDeque<ChatMessage>,
}

impl ChatRing {
    /// Create a ring holding at most `capacity` messages (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a message, returning the evicted oldest entry if the ring was full.
    pub fn push(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        let evicted = if self.messages.len() >= self.capacity {
            self.messages.pop_front()
        } else {
            None
        };
        self.messages.push_back(message);
        evicted
    }

    /// Current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Ordered, non-blocking writer from a room's chat to the registry.
pub struct ChatPersister {
    sender: mpsc::Sender<ChatMessage>,
    task: JoinHandle<()>,
    meeting_id: MeetingId,
}

impl ChatPersister {
    /// Spawn the writer task for one meeting.
    pub fn spawn(meeting_id: MeetingId, registry: Arc<dyn MeetingRegistry>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<ChatMessage>(PERSIST_CHANNEL_BUFFER);
        let task_meeting_id = meeting_id.clone();

        let task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if let Err(e) = registry
                    .persist_chat_message(&task_meeting_id, &message)
                    .await
                {
                    metrics::record_chat_persist_failure();
                    warn!(
                        target: "meet.chat",
                        meeting_id = %task_meeting_id,
                        message_id = %message.id,
                        error = %e,
                        "Failed to persist chat message"
                    );
                }
            }
        });

        Self {
            sender,
            task,
            meeting_id,
        }
    }

    /// Queue a message for persistence. Never waits; drops on backpressure.
    pub fn submit(&self, message: ChatMessage) {
        if let Err(e) = self.sender.try_send(message) {
            metrics::record_chat_persist_failure();
            warn!(
                target: "meet.chat",
                meeting_id = %self.meeting_id,
                error = %e,
                "Chat persistence queue unavailable, message not persisted"
            );
        }
    }

    /// Stop accepting messages and wait for queued writes to finish.
    pub async fn flush(self) {
        let Self {
            sender,
            task,
            meeting_id,
        } = self;
        drop(sender);

        match tokio::time::timeout(FLUSH_TIMEOUT, task).await {
            Ok(Ok(())) => {
                debug!(target: "meet.chat", meeting_id = %meeting_id, "Chat persistence flushed");
            }
            Ok(Err(e)) => {
                warn!(target: "meet.chat", meeting_id = %meeting_id, error = ?e, "Chat writer task failed");
            }
            Err(_) => {
                warn!(target: "meet.chat", meeting_id = %meeting_id, "Chat flush timed out");
            }
        }
    }
}
