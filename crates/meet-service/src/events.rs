//! Live-connection wire events.
//!
//! Every frame is a JSON object tagged by `type`. Inbound frames decode into
//! [`ClientEvent`]; everything the service pushes to a connection is a
//! [`ServerEvent`].

use crate::chat::ChatMessage;
use crate::errors::MeetError;
use crate::models::MeetingSnapshot;
use crate::signaling::SignalKind;

use chrono::{DateTime, Utc};
use common::types::RoomId;
use serde::{Deserialize, Serialize};

/// Transient per-participant boolean state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresenceFlag {
    AudioMuted,
    VideoMuted,
    HandRaised,
    ScreenSharing,
}

impl PresenceFlag {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PresenceFlag::AudioMuted => "audioMuted",
            PresenceFlag::VideoMuted => "videoMuted",
            PresenceFlag::HandRaised => "handRaised",
            PresenceFlag::ScreenSharing => "screenSharing",
        }
    }
}

/// A live room member as seen by other members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveParticipantInfo {
    pub identity: String,
    pub display_name: String,
    pub is_audio_muted: bool,
    pub is_video_muted: bool,
    pub is_hand_raised: bool,
    pub is_screen_sharing: bool,
    pub joined_at: DateTime<Utc>,
}

impl LiveParticipantInfo {
    /// A freshly joined participant with every flag cleared.
    #[must_use]
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            is_audio_muted: false,
            is_video_muted: false,
            is_hand_raised: false,
            is_screen_sharing: false,
            joined_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn flag(&self, flag: PresenceFlag) -> bool {
        match flag {
            PresenceFlag::AudioMuted => self.is_audio_muted,
            PresenceFlag::VideoMuted => self.is_video_muted,
            PresenceFlag::HandRaised => self.is_hand_raised,
            PresenceFlag::ScreenSharing => self.is_screen_sharing,
        }
    }

    pub fn set_flag(&mut self, flag: PresenceFlag, value: bool) {
        match flag {
            PresenceFlag::AudioMuted => self.is_audio_muted = value,
            PresenceFlag::VideoMuted => self.is_video_muted = value,
            PresenceFlag::HandRaised => self.is_hand_raised = value,
            PresenceFlag::ScreenSharing => self.is_screen_sharing = value,
        }
    }
}

/// Frames sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    Signal {
        kind: SignalKind,
        target_identity: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    Chat {
        body: String,
    },
    SetPresence {
        flag: PresenceFlag,
        value: bool,
    },
}

impl ClientEvent {
    /// Bounded label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::Signal { .. } => "signal",
            ClientEvent::Chat { .. } => "chat",
            ClientEvent::SetPresence { .. } => "set-presence",
        }
    }
}

/// Frames pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    RoomJoined {
        room_id: RoomId,
        snapshot: MeetingSnapshot,
    },
    RoomMembers {
        participants: Vec<LiveParticipantInfo>,
    },
    MemberJoined {
        participant: LiveParticipantInfo,
    },
    MemberLeft {
        identity: String,
    },
    Signal {
        kind: SignalKind,
        sender_identity: String,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    Chat {
        message: ChatMessage,
    },
    ChatHistory {
        messages: Vec<ChatMessage>,
    },
    PresenceChanged {
        identity: String,
        flag: PresenceFlag,
        value: bool,
    },
    Error {
        code: String,
        message: String,
    },
    MeetingEnded {
        room_id: RoomId,
    },
}

/// Code sent to a connection displaced by a newer session of the same identity.
pub const SESSION_REPLACED: &str = "SESSION_REPLACED";

impl ServerEvent {
    /// Client-facing error frame for `err`.
    #[must_use]
    pub fn error(err: &MeetError) -> Self {
        ServerEvent::Error {
            code: err.error_code().to_string(),
            message: err.client_message(),
        }
    }

    #[must_use]
    pub fn session_replaced() -> Self {
        ServerEvent::Error {
            code: SESSION_REPLACED.to_string(),
            message: "Another connection joined this room with the same identity".to_string(),
        }
    }

    /// Bounded label for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::RoomJoined { .. } => "room-joined",
            ServerEvent::RoomMembers { .. } => "room-members",
            ServerEvent::MemberJoined { .. } => "member-joined",
            ServerEvent::MemberLeft { .. } => "member-left",
            ServerEvent::Signal { .. } => "signal",
            ServerEvent::Chat { .. } => "chat",
            ServerEvent::ChatHistory { .. } => "chat-history",
            ServerEvent::PresenceChanged { .. } => "presence-changed",
            ServerEvent::Error { .. } => "error",
            ServerEvent::MeetingEnded { .. } => "meeting-ended",
        }
    }
}
