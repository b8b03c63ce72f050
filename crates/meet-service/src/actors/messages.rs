//! Message types for actor communication.
//!
//! Requests travel over `tokio::sync::mpsc`; replies come back on a
//! `tokio::sync::oneshot` carried in the request.

use crate::broadcast::ConnectionHandle;
use crate::chat::ChatMessage;
use crate::errors::MeetError;
use crate::events::{LiveParticipantInfo, PresenceFlag};
use crate::models::MeetingSettings;
use crate::signaling::SignalingEnvelope;

use super::room::RoomHandle;

use common::types::{MeetingId, RoomId};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Messages sent to `RoomControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Return the live room for a meeting, spawning it if absent.
    GetOrCreateRoom {
        meeting_id: MeetingId,
        /// Settings the room enforces if it has to be created.
        settings: MeetingSettings,
        respond_to: oneshot::Sender<Result<RoomHandle, MeetError>>,
    },

    /// Return the live room if one exists.
    GetRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Option<RoomHandle>>,
    },

    /// A room actor has torn itself down.
    RoomClosed { room_id: RoomId, generation: u64 },

    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Add a live participant. Replaces any existing session for the identity.
    Join {
        participant: LiveParticipantInfo,
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<Result<JoinReply, MeetError>>,
    },

    /// Remove a live participant. With `connection_id`, only that session
    /// is removed; without it, whichever session the identity holds.
    /// `record_leave` also closes the roster entry before replying.
    Leave {
        identity: String,
        connection_id: Option<Uuid>,
        record_leave: bool,
        respond_to: oneshot::Sender<bool>,
    },

    SetPresence {
        identity: String,
        connection_id: Uuid,
        flag: PresenceFlag,
        value: bool,
        respond_to: oneshot::Sender<Result<(), MeetError>>,
    },

    PostChat {
        identity: String,
        connection_id: Uuid,
        body: String,
        respond_to: oneshot::Sender<Result<ChatMessage, MeetError>>,
    },

    /// Forward a signaling envelope. Fire-and-forget.
    Relay {
        envelope: SignalingEnvelope,
        connection_id: Uuid,
    },

    /// The meeting was ended: notify everyone, flush chat, stop.
    End { respond_to: oneshot::Sender<()> },

    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },
}

/// What a joiner receives, captured atomically with its insertion.
#[derive(Debug, Clone)]
pub struct JoinReply {
    /// Every live member including the joiner, in join order.
    pub participants: Vec<LiveParticipantInfo>,
    /// Ring contents for replay, oldest first.
    pub chat_history: Vec<ChatMessage>,
}

/// Point-in-time view of a room.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: RoomId,
    pub participants: Vec<LiveParticipantInfo>,
    pub chat: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerStatus {
    pub room_count: usize,
    pub is_draining: bool,
}
