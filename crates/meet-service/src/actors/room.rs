//! `RoomActor` - single owner of one live room.
//!
//! Each `RoomActor`:
//! - Owns the member map, presence flags and chat ring for one room
//! - Serializes join, leave, presence, chat and relay through its mailbox
//! - Pushes events to members through an injected `Broadcaster`
//! - Never awaits registry I/O inside its loop (leave records and chat
//!   persistence run on background tasks)
//!
//! # Lifecycle
//!
//! 1. Spawned by the controller on the first join
//! 2. Runs until the last member leaves, the meeting is ended, or the
//!    controller's token is cancelled
//! 3. On exit it closes its mailbox, flushes chat persistence and reports
//!    `RoomClosed` so the controller can drop it

use crate::broadcast::{Broadcaster, ConnectionHandle};
use crate::chat::{ChatMessage, ChatPersister, ChatRing};
use crate::errors::MeetError;
use crate::events::{LiveParticipantInfo, PresenceFlag, ServerEvent};
use crate::models::MeetingSettings;
use crate::observability::metrics;
use crate::registry::MeetingRegistry;
use crate::signaling::{self, RelayOutcome, SignalingEnvelope};

use super::messages::{ControllerMessage, JoinReply, RoomMessage, RoomState};
use super::metrics::{ActorType, MailboxMonitor};

use common::types::{MeetingId, RoomId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Room mailbox depth.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Per-room limits taken from service configuration.
#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    pub chat_buffer_capacity: usize,
    pub max_chat_message_length: usize,
}

/// Join outcome other than success.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error(transparent)]
    Rejected(#[from] MeetError),

    /// The room stopped before answering; fetch a fresh handle and retry.
    #[error("room closed")]
    RoomClosed,
}

/// Handle to a `RoomActor`.
#[derive(Clone, Debug)]
pub struct RoomHandle {
    room_id: RoomId,
    generation: u64,
    sender: mpsc::Sender<RoomMessage>,
}

impl RoomHandle {
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Distinguishes successive actors for the same room identifier.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once the actor has stopped accepting messages.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Add a live participant and receive the member list and chat replay.
    pub async fn join(
        &self,
        participant: LiveParticipantInfo,
        connection: ConnectionHandle,
    ) -> Result<JoinReply, JoinError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Join {
                participant,
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|_| JoinError::RoomClosed)?;

        rx.await
            .map_err(|_| JoinError::RoomClosed)?
            .map_err(JoinError::Rejected)
    }

    /// Remove a participant. Returns false if nothing was removed.
    ///
    /// With `record_leave`, resolves only after the registry write.
    pub async fn leave(
        &self,
        identity: &str,
        connection_id: Option<Uuid>,
        record_leave: bool,
    ) -> bool {
        let (tx, rx) = oneshot::channel();
        let sent = self
            .sender
            .send(RoomMessage::Leave {
                identity: identity.to_string(),
                connection_id,
                record_leave,
                respond_to: tx,
            })
            .await;

        sent.is_ok() && rx.await.unwrap_or(false)
    }

    pub async fn set_presence(
        &self,
        identity: &str,
        connection_id: Uuid,
        flag: PresenceFlag,
        value: bool,
    ) -> Result<(), MeetError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::SetPresence {
                identity: identity.to_string(),
                connection_id,
                flag,
                value,
                respond_to: tx,
            })
            .await
            .map_err(|_| MeetError::NotInRoom)?;

        rx.await.map_err(|_| MeetError::NotInRoom)?
    }

    pub async fn post_chat(
        &self,
        identity: &str,
        connection_id: Uuid,
        body: String,
    ) -> Result<ChatMessage, MeetError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::PostChat {
                identity: identity.to_string(),
                connection_id,
                body,
                respond_to: tx,
            })
            .await
            .map_err(|_| MeetError::NotInRoom)?;

        rx.await.map_err(|_| MeetError::NotInRoom)?
    }

    /// Queue a signaling envelope. Never reports delivery.
    pub async fn relay(&self, envelope: SignalingEnvelope, connection_id: Uuid) {
        let _ = self
            .sender
            .send(RoomMessage::Relay {
                envelope,
                connection_id,
            })
            .await;
    }

    /// End the room and wait for its teardown (chat flushed).
    pub async fn end(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RoomMessage::End { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Snapshot of members and chat, or `None` if the room is gone.
    pub async fn state(&self) -> Option<RoomState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::GetState { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }
}

struct Member {
    info: LiveParticipantInfo,
    connection: ConnectionHandle,
}

impl Member {
    fn is_session(&self, identity: &str, connection_id: Uuid) -> bool {
        self.info.identity == identity && self.connection.connection_id() == connection_id
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: RoomId,
    meeting_id: MeetingId,
    generation: u64,
    settings: MeetingSettings,
    max_chat_message_length: usize,
    /// Live members in join order.
    members: Vec<Member>,
    chat: ChatRing,
    persister: Option<ChatPersister>,
    registry: Arc<dyn MeetingRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    controller: mpsc::Sender<ControllerMessage>,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    mailbox: MailboxMonitor,
    /// Set once the meeting has ended; suppresses leave records.
    meeting_ended: bool,
    end_waiters: Vec<oneshot::Sender<()>>,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        meeting_id: MeetingId,
        generation: u64,
        settings: MeetingSettings,
        config: RoomConfig,
        registry: Arc<dyn MeetingRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
        controller: mpsc::Sender<ControllerMessage>,
        cancel_token: CancellationToken,
    ) -> (RoomHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let room_id = meeting_id.room_id();

        let actor = Self {
            room_id: room_id.clone(),
            meeting_id: meeting_id.clone(),
            generation,
            settings,
            max_chat_message_length: config.max_chat_message_length,
            members: Vec::new(),
            chat: ChatRing::new(config.chat_buffer_capacity),
            persister: Some(ChatPersister::spawn(meeting_id, Arc::clone(&registry))),
            registry,
            broadcaster,
            controller,
            receiver,
            cancel_token,
            mailbox: MailboxMonitor::new(ActorType::Room, room_id.as_str()),
            meeting_ended: false,
            end_waiters: Vec::new(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomHandle {
            room_id,
            generation,
            sender,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "meet.actor.room",
        fields(room_id = %self.room_id, generation = self.generation)
    )]
    async fn run(mut self) {
        debug!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            generation = self.generation,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "meet.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.release_all_members().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        break;
                    };
                    let should_close = self.handle_message(message);
                    self.mailbox.record_processed(self.receiver.len());
                    if should_close {
                        break;
                    }
                }
            }
        }

        self.teardown().await;
    }

    /// Handle a single message. Returns true if the room should close.
    fn handle_message(&mut self, message: RoomMessage) -> bool {
        match message {
            RoomMessage::Join {
                participant,
                connection,
                respond_to,
            } => {
                let result = self.handle_join(participant, connection);
                let failed = result.is_err();
                let _ = respond_to.send(result);
                failed && self.members.is_empty()
            }

            RoomMessage::Leave {
                identity,
                connection_id,
                record_leave,
                respond_to,
            } => {
                self.handle_leave(&identity, connection_id, record_leave, respond_to);
                self.members.is_empty()
            }

            RoomMessage::SetPresence {
                identity,
                connection_id,
                flag,
                value,
                respond_to,
            } => {
                let result = self.handle_set_presence(&identity, connection_id, flag, value);
                let _ = respond_to.send(result);
                false
            }

            RoomMessage::PostChat {
                identity,
                connection_id,
                body,
                respond_to,
            } => {
                let result = self.handle_post_chat(&identity, connection_id, body);
                let _ = respond_to.send(result);
                false
            }

            RoomMessage::Relay {
                envelope,
                connection_id,
            } => {
                self.handle_relay(envelope, connection_id);
                false
            }

            RoomMessage::End { respond_to } => {
                self.handle_end();
                self.end_waiters.push(respond_to);
                true
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
                false
            }
        }
    }

    fn handle_join(
        &mut self,
        participant: LiveParticipantInfo,
        connection: ConnectionHandle,
    ) -> Result<JoinReply, MeetError> {
        if self.meeting_ended {
            return Err(MeetError::MeetingEnded);
        }

        let existing = self
            .members
            .iter()
            .position(|m| m.info.identity == participant.identity);

        let occupied = self.members.len() - usize::from(existing.is_some());
        let limit = usize::try_from(self.settings.max_participants).unwrap_or(usize::MAX);
        if occupied >= limit {
            debug!(
                target: "meet.actor.room",
                room_id = %self.room_id,
                occupied,
                limit,
                "Join rejected, room full"
            );
            return Err(MeetError::RoomFull);
        }

        if let Some(idx) = existing {
            let replaced = self.members.remove(idx);
            self.broadcaster
                .send_to(&replaced.connection, ServerEvent::session_replaced());
            self.broadcast_except(
                None,
                &ServerEvent::MemberLeft {
                    identity: replaced.info.identity.clone(),
                },
            );
            metrics::record_room_leave();

            info!(
                target: "meet.actor.room",
                room_id = %self.room_id,
                identity = %replaced.info.identity,
                old_connection_id = %replaced.connection.connection_id(),
                new_connection_id = %connection.connection_id(),
                "Session replaced"
            );
        }

        self.broadcast_except(
            None,
            &ServerEvent::MemberJoined {
                participant: participant.clone(),
            },
        );

        let notice = format!("{} joined", participant.display_name);
        let identity = participant.identity.clone();
        self.members.push(Member {
            info: participant,
            connection,
        });
        metrics::record_room_join();
        self.append_system_message(&identity, notice);

        info!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            identity = %identity,
            participant_count = self.members.len(),
            "Participant joined room"
        );

        Ok(JoinReply {
            participants: self.participants(),
            chat_history: self.chat.snapshot(),
        })
    }

    fn handle_leave(
        &mut self,
        identity: &str,
        connection_id: Option<Uuid>,
        record_leave: bool,
        respond_to: oneshot::Sender<bool>,
    ) {
        let position = self.members.iter().position(|m| {
            m.info.identity == identity
                && connection_id.map_or(true, |id| m.connection.connection_id() == id)
        });

        let Some(idx) = position else {
            let _ = respond_to.send(false);
            return;
        };

        let member = self.members.remove(idx);
        let left = ServerEvent::MemberLeft {
            identity: member.info.identity.clone(),
        };

        // Removed from outside its own connection: tell that session too
        if connection_id.is_none() {
            self.broadcaster.send_to(&member.connection, left.clone());
        }
        self.broadcast_except(None, &left);
        metrics::record_room_leave();
        self.append_system_message(identity, format!("{} left", member.info.display_name));

        info!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            identity = %identity,
            participant_count = self.members.len(),
            "Participant left room"
        );

        if record_leave && !self.meeting_ended {
            let registry = Arc::clone(&self.registry);
            let meeting_id = self.meeting_id.clone();
            let identity = identity.to_string();
            tokio::spawn(async move {
                if let Err(e) = registry.record_leave(&meeting_id, &identity).await {
                    warn!(
                        target: "meet.actor.room",
                        meeting_id = %meeting_id,
                        error = %e,
                        "Failed to record leave"
                    );
                }
                let _ = respond_to.send(true);
            });
        } else {
            let _ = respond_to.send(true);
        }
    }

    fn handle_set_presence(
        &mut self,
        identity: &str,
        connection_id: Uuid,
        flag: PresenceFlag,
        value: bool,
    ) -> Result<(), MeetError> {
        if flag == PresenceFlag::ScreenSharing && value && !self.settings.allow_screen_share {
            return Err(MeetError::ScreenShareDisabled);
        }

        let Some(member) = self
            .members
            .iter_mut()
            .find(|m| m.is_session(identity, connection_id))
        else {
            return Ok(());
        };

        if member.info.flag(flag) == value {
            return Ok(());
        }
        member.info.set_flag(flag, value);

        self.broadcast_except(
            Some(identity),
            &ServerEvent::PresenceChanged {
                identity: identity.to_string(),
                flag,
                value,
            },
        );

        debug!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            identity = %identity,
            flag = flag.as_str(),
            value,
            "Presence updated"
        );

        Ok(())
    }

    fn handle_post_chat(
        &mut self,
        identity: &str,
        connection_id: Uuid,
        body: String,
    ) -> Result<ChatMessage, MeetError> {
        let sender_name = self
            .members
            .iter()
            .find(|m| m.is_session(identity, connection_id))
            .map(|m| m.info.display_name.clone())
            .ok_or(MeetError::NotInRoom)?;

        if !self.settings.allow_chat {
            return Err(MeetError::ChatDisabled);
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(MeetError::BadRequest(
                "Chat message must not be empty".to_string(),
            ));
        }
        if body.chars().count() > self.max_chat_message_length {
            return Err(MeetError::BadRequest(format!(
                "Chat message must be at most {} characters",
                self.max_chat_message_length
            )));
        }

        let message = ChatMessage::text(
            self.room_id.clone(),
            identity,
            &sender_name,
            body.to_string(),
        );
        self.chat.push(message.clone());
        self.broadcast_except(
            None,
            &ServerEvent::Chat {
                message: message.clone(),
            },
        );
        if let Some(persister) = &self.persister {
            persister.submit(message.clone());
        }
        metrics::record_chat_message(message.kind.as_str());

        Ok(message)
    }

    fn handle_relay(&mut self, envelope: SignalingEnvelope, connection_id: Uuid) {
        if !self
            .members
            .iter()
            .any(|m| m.is_session(&envelope.sender_identity, connection_id))
        {
            debug!(
                target: "meet.actor.room",
                room_id = %self.room_id,
                "Signal from a session no longer in the room, dropped"
            );
            return;
        }

        let target = self
            .members
            .iter()
            .find(|m| m.info.identity == envelope.target_identity)
            .map(|m| &m.connection);

        let kind = envelope.kind;
        if signaling::relay(target, envelope, self.broadcaster.as_ref())
            == RelayOutcome::TargetAbsent
        {
            debug!(
                target: "meet.actor.room",
                room_id = %self.room_id,
                kind = kind.as_str(),
                "Signal target not in room, dropped"
            );
        }
    }

    fn handle_end(&mut self) {
        self.meeting_ended = true;

        let ended = ServerEvent::MeetingEnded {
            room_id: self.room_id.clone(),
        };
        self.broadcast_except(None, &ended);
        self.drop_all_members();

        info!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            "Meeting ended, room closing"
        );
    }

    fn drop_all_members(&mut self) {
        for _ in self.members.drain(..) {
            metrics::record_room_leave();
        }
    }

    /// Drop every member and record their leaves unless the meeting ended.
    async fn release_all_members(&mut self) {
        let identities: Vec<String> = self
            .members
            .drain(..)
            .map(|member| {
                metrics::record_room_leave();
                member.info.identity
            })
            .collect();
        if self.meeting_ended || identities.is_empty() {
            return;
        }

        let registry = &self.registry;
        let meeting_id = &self.meeting_id;
        let results = futures::future::join_all(
            identities
                .iter()
                .map(|identity| registry.record_leave(meeting_id, identity)),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(
                target: "meet.actor.room",
                meeting_id = %self.meeting_id,
                failed,
                "Failed to record leaves on shutdown"
            );
        }
        debug!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            released = identities.len(),
            "Released members on shutdown"
        );
    }

    fn state(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            participants: self.participants(),
            chat: self.chat.snapshot(),
        }
    }

    fn participants(&self) -> Vec<LiveParticipantInfo> {
        self.members.iter().map(|m| m.info.clone()).collect()
    }

    fn append_system_message(&mut self, identity: &str, body: String) {
        let message = ChatMessage::system(self.room_id.clone(), identity, body);
        self.chat.push(message.clone());
        if let Some(persister) = &self.persister {
            persister.submit(message);
        }
        metrics::record_chat_message("system");
    }

    /// Send `event` to every member except `skip_identity`.
    fn broadcast_except(&self, skip_identity: Option<&str>, event: &ServerEvent) {
        let targets: Vec<&ConnectionHandle> = self
            .members
            .iter()
            .filter(|m| Some(m.info.identity.as_str()) != skip_identity)
            .map(|m| &m.connection)
            .collect();
        self.broadcaster.broadcast(&targets, event);
    }

    async fn teardown(mut self) {
        // Refuse new messages; anything already queued is answered by
        // dropping its reply channel, which callers treat as "room closed".
        self.receiver.close();
        let mut drained = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            drained += 1;
            if let RoomMessage::End { respond_to } = message {
                self.end_waiters.push(respond_to);
            }
        }

        if let Some(persister) = self.persister.take() {
            persister.flush().await;
        }

        // A lost notification is harmless: the controller replaces closed
        // handles on the next lookup.
        if self
            .controller
            .try_send(ControllerMessage::RoomClosed {
                room_id: self.room_id.clone(),
                generation: self.generation,
            })
            .is_err()
        {
            debug!(
                target: "meet.actor.room",
                room_id = %self.room_id,
                "Controller unavailable for RoomClosed"
            );
        }

        for waiter in self.end_waiters.drain(..) {
            let _ = waiter.send(());
        }

        info!(
            target: "meet.actor.room",
            room_id = %self.room_id,
            generation = self.generation,
            drained,
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "RoomActor stopped"
        );
    }
}
