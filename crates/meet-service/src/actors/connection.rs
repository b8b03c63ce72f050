//! `ConnectionActor` - one per live client connection.
//!
//! Each `ConnectionActor`:
//! - Owns the client's membership in at most one room
//! - Turns inbound [`ClientEvent`]s into room operations
//! - Forwards room events to the transport in the order the room produced
//!   them, after the join reply
//!
//! The actor is transport-agnostic: the WebSocket handler feeds decoded
//! frames in and drains [`ServerEvent`]s out, and tests drive it over plain
//! channels.
//!
//! # Lifecycle
//!
//! 1. Spawned when the transport is accepted
//! 2. Runs until the transport goes away, the meeting ends, or the
//!    controller's token is cancelled
//! 3. A transport that goes away while in a room leaves it exactly once

use crate::broadcast::ConnectionHandle;
use crate::errors::MeetError;
use crate::events::{ClientEvent, LiveParticipantInfo, ServerEvent, SESSION_REPLACED};
use crate::registry::MeetingRegistry;
use crate::signaling::SignalingEnvelope;

use super::controller::RoomControllerHandle;
use super::metrics::{ActorType, MailboxMonitor};
use super::room::RoomHandle;

use common::types::RoomId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Inbound frame queue depth.
const CONNECTION_CHANNEL_BUFFER: usize = 200;

/// A frame read from the transport.
#[derive(Debug)]
pub enum InboundFrame {
    Event(ClientEvent),
    /// The frame could not be decoded; the reason is echoed to the client.
    Malformed(String),
}

/// Handle to a `ConnectionActor`.
///
/// Dropping every clone tells the actor the transport is gone.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<InboundFrame>,
    cancel_token: CancellationToken,
    identity: String,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Hand a decoded client event to the actor.
    ///
    /// # Errors
    ///
    /// `Internal` if the actor has stopped.
    pub async fn send(&self, event: ClientEvent) -> Result<(), MeetError> {
        self.deliver(InboundFrame::Event(event)).await
    }

    /// Report an undecodable frame.
    ///
    /// # Errors
    ///
    /// `Internal` if the actor has stopped.
    pub async fn send_malformed(&self, reason: String) -> Result<(), MeetError> {
        self.deliver(InboundFrame::Malformed(reason)).await
    }

    async fn deliver(&self, frame: InboundFrame) -> Result<(), MeetError> {
        self.sender
            .send(frame)
            .await
            .map_err(|e| MeetError::Internal(format!("channel send failed: {e}")))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Membership in one room. Each join gets its own outbound queue and
/// connection id, so nothing from a previous room can leak into this one.
struct Membership {
    room: RoomHandle,
    connection: ConnectionHandle,
    events: mpsc::Receiver<ServerEvent>,
}

impl Membership {
    fn connection_id(&self) -> Uuid {
        self.connection.connection_id()
    }
}

/// What to do after forwarding a room event.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    identity: String,
    display_name: String,
    receiver: mpsc::Receiver<InboundFrame>,
    outbound: mpsc::Sender<ServerEvent>,
    registry: Arc<dyn MeetingRegistry>,
    rooms: RoomControllerHandle,
    current: Option<Membership>,
    cancel_token: CancellationToken,
    mailbox: MailboxMonitor,
}

impl ConnectionActor {
    /// Spawn a connection actor writing to `outbound`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        identity: String,
        display_name: String,
        registry: Arc<dyn MeetingRegistry>,
        rooms: RoomControllerHandle,
        outbound: mpsc::Sender<ServerEvent>,
        cancel_token: CancellationToken,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_CHANNEL_BUFFER);

        let actor = Self {
            identity: identity.clone(),
            display_name,
            receiver,
            outbound,
            registry,
            rooms,
            current: None,
            cancel_token: cancel_token.clone(),
            mailbox: MailboxMonitor::new(ActorType::Connection, &identity),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            identity,
        };

        (handle, task_handle)
    }

    #[instrument(skip_all, name = "meet.actor.connection", fields(identity = %self.identity))]
    async fn run(mut self) {
        debug!(
            target: "meet.actor.connection",
            identity = %self.identity,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "meet.actor.connection",
                        identity = %self.identity,
                        "ConnectionActor received cancellation signal"
                    );
                    break;
                }

                frame = self.receiver.recv() => {
                    let Some(frame) = frame else {
                        // Transport gone
                        self.leave_current().await;
                        break;
                    };
                    self.handle_frame(frame).await;
                    self.mailbox.record_processed(self.receiver.len());
                }

                event = next_room_event(&mut self.current) => {
                    let flow = match event {
                        Some(event) => self.forward(event).await,
                        None => {
                            self.current = None;
                            Flow::Continue
                        }
                    };
                    if flow == Flow::Close {
                        break;
                    }
                }
            }

            if self.outbound.is_closed() {
                self.leave_current().await;
                break;
            }
        }

        info!(
            target: "meet.actor.connection",
            identity = %self.identity,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    async fn handle_frame(&mut self, frame: InboundFrame) {
        let event = match frame {
            InboundFrame::Event(event) => event,
            InboundFrame::Malformed(reason) => {
                self.write(ServerEvent::error(&MeetError::BadRequest(reason)))
                    .await;
                return;
            }
        };

        let name = event.name();
        if let Err(e) = self.handle_event(event).await {
            debug!(
                target: "meet.actor.connection",
                identity = %self.identity,
                event = name,
                code = e.error_code(),
                "Client event rejected"
            );
            self.write(ServerEvent::error(&e)).await;
        }
    }

    async fn handle_event(&mut self, event: ClientEvent) -> Result<(), MeetError> {
        match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(&room_id).await,

            ClientEvent::LeaveRoom { room_id } => {
                let in_room = self
                    .current
                    .as_ref()
                    .is_some_and(|m| m.room.room_id().as_str() == room_id);
                if !in_room {
                    return Err(MeetError::NotInRoom);
                }
                self.leave_current().await;
                // Acknowledge with the same event the rest of the room saw
                self.write(ServerEvent::MemberLeft {
                    identity: self.identity.clone(),
                })
                .await;
                Ok(())
            }

            ClientEvent::Signal {
                kind,
                target_identity,
                payload,
            } => {
                let membership = self.current.as_ref().ok_or(MeetError::NotInRoom)?;
                membership
                    .room
                    .relay(
                        SignalingEnvelope {
                            kind,
                            sender_identity: self.identity.clone(),
                            target_identity,
                            payload,
                        },
                        membership.connection_id(),
                    )
                    .await;
                Ok(())
            }

            ClientEvent::Chat { body } => {
                let membership = self.current.as_ref().ok_or(MeetError::NotInRoom)?;
                membership
                    .room
                    .post_chat(&self.identity, membership.connection_id(), body)
                    .await
                    .map(|_| ())
            }

            ClientEvent::SetPresence { flag, value } => {
                let membership = self.current.as_ref().ok_or(MeetError::NotInRoom)?;
                membership
                    .room
                    .set_presence(&self.identity, membership.connection_id(), flag, value)
                    .await
            }
        }
    }

    async fn join_room(&mut self, raw_room_id: &str) -> Result<(), MeetError> {
        let room_id =
            RoomId::parse(raw_room_id).map_err(|e| MeetError::BadRequest(e.to_string()))?;

        if self
            .current
            .as_ref()
            .is_some_and(|m| m.room.room_id() == &room_id)
        {
            return Err(MeetError::Conflict("Already in this room".to_string()));
        }

        let meeting_id = room_id.meeting_id();
        let meeting = self.registry.get_meeting(&meeting_id).await?;
        if meeting.status.is_closed() {
            return Err(MeetError::MeetingEnded);
        }
        if !self
            .registry
            .is_active_participant(&meeting_id, &self.identity)
            .await?
        {
            return Err(MeetError::NotAdmitted);
        }

        // One room per connection
        self.leave_current().await;

        let (connection, events) = ConnectionHandle::channel(self.identity.clone());
        let participant = LiveParticipantInfo::new(self.identity.clone(), self.display_name.clone());
        let (room, reply) = self
            .rooms
            .join_room(&meeting_id, meeting.settings, participant, connection.clone())
            .await?;

        self.current = Some(Membership {
            room,
            connection,
            events,
        });

        info!(
            target: "meet.actor.connection",
            identity = %self.identity,
            room_id = %room_id,
            participant_count = reply.participants.len(),
            "Joined room"
        );

        // Room events queued since the join stay behind these three
        self.write(ServerEvent::RoomJoined {
            room_id,
            snapshot: meeting.snapshot(),
        })
        .await;
        self.write(ServerEvent::RoomMembers {
            participants: reply.participants,
        })
        .await;
        self.write(ServerEvent::ChatHistory {
            messages: reply.chat_history,
        })
        .await;

        Ok(())
    }

    /// Forward a room event, resetting membership when the room let us go.
    async fn forward(&mut self, event: ServerEvent) -> Flow {
        let flow = match &event {
            ServerEvent::MeetingEnded { .. } => {
                self.current = None;
                Flow::Close
            }
            ServerEvent::Error { code, .. } if code == SESSION_REPLACED => {
                self.current = None;
                Flow::Continue
            }
            ServerEvent::MemberLeft { identity } if *identity == self.identity => {
                self.current = None;
                Flow::Continue
            }
            _ => Flow::Continue,
        };

        self.write(event).await;
        flow
    }

    /// Leave the current room, recording the leave. No-op outside a room.
    async fn leave_current(&mut self) {
        let Some(membership) = self.current.take() else {
            return;
        };

        let removed = membership
            .room
            .leave(&self.identity, Some(membership.connection_id()), true)
            .await;

        debug!(
            target: "meet.actor.connection",
            identity = %self.identity,
            room_id = %membership.room.room_id(),
            removed,
            "Left room"
        );
    }

    async fn write(&self, event: ServerEvent) {
        if self.outbound.send(event).await.is_err() {
            debug!(
                target: "meet.actor.connection",
                identity = %self.identity,
                "Transport closed, event not written"
            );
        }
    }
}

async fn next_room_event(current: &mut Option<Membership>) -> Option<ServerEvent> {
    match current {
        Some(membership) => membership.events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::actors::room::RoomConfig;
    use crate::admission::{self, AdmissionRequest};
    use crate::broadcast::ChannelBroadcaster;
    use crate::events::PresenceFlag;
    use crate::models::{MeetingSettings, NewMeeting};
    use crate::registry::InMemoryMeetingRegistry;
    use crate::signaling::SignalKind;
    use common::types::MeetingId;
    use std::time::Duration;

    const HOST: &str = "hostaaaaaaaaaaaaaaaaaaaa";
    const ALICE: &str = "aliceaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "bobaaaaaaaaaaaaaaaaaaaaa";

    struct Harness {
        registry: Arc<InMemoryMeetingRegistry>,
        rooms: RoomControllerHandle,
        meeting_id: MeetingId,
    }

    struct Client {
        handle: ConnectionActorHandle,
        outbound: mpsc::Receiver<ServerEvent>,
        task: JoinHandle<()>,
    }

    impl Client {
        async fn next(&mut self) -> ServerEvent {
            tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
                .await
                .expect("timed out waiting for event")
                .expect("outbound closed")
        }

        async fn send(&self, event: ClientEvent) {
            self.handle.send(event).await.unwrap();
        }
    }

    async fn harness() -> Harness {
        let registry = Arc::new(InMemoryMeetingRegistry::new());
        let meeting = registry
            .create_meeting(NewMeeting {
                title: "Live".to_string(),
                description: None,
                creator_identity: HOST.to_string(),
                settings: MeetingSettings::with_limit(6),
                password_hash: None,
            })
            .await
            .unwrap();
        let rooms = RoomControllerHandle::new(
            registry.clone(),
            Arc::new(ChannelBroadcaster),
            RoomConfig {
                chat_buffer_capacity: 100,
                max_chat_message_length: 2000,
            },
        );
        Harness {
            registry,
            rooms,
            meeting_id: meeting.meeting_id,
        }
    }

    impl Harness {
        async fn admit(&self, identity: &str) {
            admission::admit(
                self.registry.as_ref(),
                &self.meeting_id,
                AdmissionRequest {
                    identity: identity.to_string(),
                    display_name: identity.to_string(),
                    email: String::new(),
                    password: None,
                },
            )
            .await
            .unwrap();
        }

        fn connect(&self, identity: &str) -> Client {
            let (tx, rx) = mpsc::channel(64);
            let (handle, task) = ConnectionActor::spawn(
                identity.to_string(),
                identity.to_string(),
                self.registry.clone(),
                self.rooms.clone(),
                tx,
                self.rooms.child_token(),
            );
            Client {
                handle,
                outbound: rx,
                task,
            }
        }

        fn join_event(&self) -> ClientEvent {
            ClientEvent::JoinRoom {
                room_id: self.meeting_id.room_id().to_string(),
            }
        }

        /// Connect, join and consume the three join frames.
        async fn joined(&self, identity: &str) -> Client {
            self.admit(identity).await;
            let mut client = self.connect(identity);
            client.send(self.join_event()).await;
            for _ in 0..3 {
                client.next().await;
            }
            client
        }
    }

    fn error_code(event: &ServerEvent) -> &str {
        match event {
            ServerEvent::Error { code, .. } => code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_join_without_admission_rejected() {
        let h = harness().await;
        let mut client = h.connect(ALICE);

        client.send(h.join_event()).await;
        assert_eq!(error_code(&client.next().await), "NOT_ADMITTED");
    }

    #[tokio::test]
    async fn test_join_sends_snapshot_members_then_history() {
        let h = harness().await;
        h.admit(ALICE).await;
        let mut client = h.connect(ALICE);

        client.send(h.join_event()).await;

        match client.next().await {
            ServerEvent::RoomJoined { room_id, snapshot } => {
                assert_eq!(room_id, h.meeting_id.room_id());
                assert_eq!(snapshot.meeting_id, h.meeting_id);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match client.next().await {
            ServerEvent::RoomMembers { participants } => {
                assert_eq!(participants.len(), 1);
                assert_eq!(participants[0].identity, ALICE);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            client.next().await,
            ServerEvent::ChatHistory { .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_room() {
        let h = harness().await;
        let mut client = h.connect(ALICE);

        client.handle.send_malformed("bad json".to_string()).await.unwrap();
        assert_eq!(error_code(&client.next().await), "BAD_REQUEST");

        client
            .send(ClientEvent::JoinRoom {
                room_id: "lobby".to_string(),
            })
            .await;
        assert_eq!(error_code(&client.next().await), "BAD_REQUEST");

        client
            .send(ClientEvent::JoinRoom {
                room_id: "room-doesnotexist".to_string(),
            })
            .await;
        assert_eq!(error_code(&client.next().await), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_room_operations_require_membership() {
        let h = harness().await;
        let mut client = h.connect(ALICE);

        client
            .send(ClientEvent::Chat {
                body: "hi".to_string(),
            })
            .await;
        assert_eq!(error_code(&client.next().await), "NOT_IN_ROOM");

        client
            .send(ClientEvent::SetPresence {
                flag: PresenceFlag::AudioMuted,
                value: true,
            })
            .await;
        assert_eq!(error_code(&client.next().await), "NOT_IN_ROOM");

        client
            .send(ClientEvent::LeaveRoom {
                room_id: h.meeting_id.room_id().to_string(),
            })
            .await;
        assert_eq!(error_code(&client.next().await), "NOT_IN_ROOM");
    }

    #[tokio::test]
    async fn test_duplicate_join_conflicts() {
        let h = harness().await;
        let mut alice = h.joined(ALICE).await;

        alice.send(h.join_event()).await;
        assert_eq!(error_code(&alice.next().await), "CONFLICT");
    }

    #[tokio::test]
    async fn test_two_clients_chat_signal_presence() {
        let h = harness().await;
        let mut alice = h.joined(ALICE).await;
        let mut bob = h.joined(BOB).await;

        match alice.next().await {
            ServerEvent::MemberJoined { participant } => assert_eq!(participant.identity, BOB),
            other => panic!("unexpected event {other:?}"),
        }

        alice
            .send(ClientEvent::Signal {
                kind: SignalKind::Offer,
                target_identity: BOB.to_string(),
                payload: serde_json::json!({"sdp": "v=0"}),
            })
            .await;
        match bob.next().await {
            ServerEvent::Signal {
                kind,
                sender_identity,
                ..
            } => {
                assert_eq!(kind, SignalKind::Offer);
                assert_eq!(sender_identity, ALICE);
            }
            other => panic!("unexpected event {other:?}"),
        }

        bob.send(ClientEvent::SetPresence {
            flag: PresenceFlag::HandRaised,
            value: true,
        })
        .await;
        assert_eq!(
            alice.next().await,
            ServerEvent::PresenceChanged {
                identity: BOB.to_string(),
                flag: PresenceFlag::HandRaised,
                value: true,
            }
        );

        bob.send(ClientEvent::Chat {
            body: "hello".to_string(),
        })
        .await;
        for client in [&mut alice, &mut bob] {
            match client.next().await {
                ServerEvent::Chat { message } => {
                    assert_eq!(message.body, "hello");
                    assert_eq!(message.sender_identity, BOB);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_explicit_leave_is_acknowledged_and_recorded() {
        let h = harness().await;
        let mut alice = h.joined(ALICE).await;
        let mut bob = h.joined(BOB).await;
        let _ = alice.next().await; // bob joined

        bob.send(ClientEvent::LeaveRoom {
            room_id: h.meeting_id.room_id().to_string(),
        })
        .await;

        assert_eq!(
            bob.next().await,
            ServerEvent::MemberLeft {
                identity: BOB.to_string()
            }
        );
        assert_eq!(
            alice.next().await,
            ServerEvent::MemberLeft {
                identity: BOB.to_string()
            }
        );
        assert!(!h
            .registry
            .is_active_participant(&h.meeting_id, BOB)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_transport_drop_leaves_room() {
        let h = harness().await;
        let mut alice = h.joined(ALICE).await;
        let bob = h.joined(BOB).await;
        let _ = alice.next().await; // bob joined

        let Client { handle, task, .. } = bob;
        drop(handle);
        task.await.unwrap();

        assert_eq!(
            alice.next().await,
            ServerEvent::MemberLeft {
                identity: BOB.to_string()
            }
        );
        assert!(!h
            .registry
            .is_active_participant(&h.meeting_id, BOB)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_meeting_end_closes_connection() {
        let h = harness().await;
        let mut alice = h.joined(ALICE).await;

        h.rooms.end_room(&h.meeting_id.room_id()).await;

        assert!(matches!(
            alice.next().await,
            ServerEvent::MeetingEnded { .. }
        ));
        alice.task.await.unwrap();
        assert!(alice.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_old_session() {
        let h = harness().await;
        let mut first = h.joined(ALICE).await;
        let mut second = h.joined(ALICE).await;

        assert_eq!(error_code(&first.next().await), SESSION_REPLACED);

        // The displaced connection is no longer in the room
        first
            .send(ClientEvent::Chat {
                body: "still here?".to_string(),
            })
            .await;
        assert_eq!(error_code(&first.next().await), "NOT_IN_ROOM");

        second
            .send(ClientEvent::Chat {
                body: "yes".to_string(),
            })
            .await;
        assert!(matches!(second.next().await, ServerEvent::Chat { .. }));
    }
}
