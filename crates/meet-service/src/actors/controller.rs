//! `RoomControllerActor` - singleton supervisor for room actors.
//!
//! - Maps room identifiers to live `RoomActor` handles
//! - Spawns a room lazily on the first join and forgets it when the room
//!   reports `RoomClosed`
//! - Owns the root `CancellationToken`; every room runs on a child token
//! - Watches room tasks for panics
//!
//! The controller only hands out handles. Joins, chat and presence go to
//! the room actor directly so one busy room never delays another.
//!
//! # Graceful Shutdown
//!
//! Cancelling the root token stops every room (each flushes its chat), the
//! controller waits for the room tasks, then signals completion to
//! [`RoomControllerHandle::shutdown`].

use crate::broadcast::{Broadcaster, ConnectionHandle};
use crate::errors::MeetError;
use crate::events::LiveParticipantInfo;
use crate::models::MeetingSettings;
use crate::observability::metrics;
use crate::registry::MeetingRegistry;

use super::messages::{ControllerMessage, ControllerStatus, JoinReply};
use super::metrics::{ActorType, MailboxMonitor};
use super::room::{JoinError, RoomActor, RoomConfig, RoomHandle};

use common::types::{MeetingId, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Controller mailbox depth.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// How many times a join chases a room that closed underneath it.
const JOIN_ATTEMPTS: usize = 3;

/// Upper bound on waiting for a single room task during shutdown.
const ROOM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to the `RoomControllerActor`.
#[derive(Clone, Debug)]
pub struct RoomControllerHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    /// Cancelled by the actor once every room has stopped.
    stopped: CancellationToken,
}

impl RoomControllerHandle {
    /// Spawn the controller actor and return a handle to it.
    #[must_use]
    pub fn new(
        registry: Arc<dyn MeetingRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
        room_config: RoomConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();
        let stopped = CancellationToken::new();

        let actor = RoomControllerActor {
            receiver,
            self_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            stopped: stopped.clone(),
            rooms: HashMap::new(),
            next_generation: 0,
            registry,
            broadcaster,
            room_config,
            accepting_new: true,
            mailbox: MailboxMonitor::new(ActorType::Controller, "rooms"),
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            stopped,
        }
    }

    /// Return the live room for `meeting_id`, spawning one if needed.
    pub async fn get_or_create_room(
        &self,
        meeting_id: &MeetingId,
        settings: MeetingSettings,
    ) -> Result<RoomHandle, MeetError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetOrCreateRoom {
                meeting_id: meeting_id.clone(),
                settings,
                respond_to: tx,
            })
            .await
            .map_err(|e| MeetError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| MeetError::Internal(format!("response receive failed: {e}")))?
    }

    /// Return the live room if one exists.
    pub async fn get_room(&self, room_id: &RoomId) -> Option<RoomHandle> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetRoom {
                room_id: room_id.clone(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok().flatten()
    }

    /// Join the live room for `meeting_id`, creating it if needed.
    ///
    /// Retries when the room closes between lookup and join.
    pub async fn join_room(
        &self,
        meeting_id: &MeetingId,
        settings: MeetingSettings,
        participant: LiveParticipantInfo,
        connection: ConnectionHandle,
    ) -> Result<(RoomHandle, JoinReply), MeetError> {
        for attempt in 1..=JOIN_ATTEMPTS {
            let room = self.get_or_create_room(meeting_id, settings).await?;
            match room.join(participant.clone(), connection.clone()).await {
                Ok(reply) => return Ok((room, reply)),
                Err(JoinError::Rejected(e)) => return Err(e),
                Err(JoinError::RoomClosed) => {
                    debug!(
                        target: "meet.actor.controller",
                        meeting_id = %meeting_id,
                        attempt,
                        "Room closed during join, retrying"
                    );
                }
            }
        }

        Err(MeetError::Internal(
            "room kept closing during join".to_string(),
        ))
    }

    /// Remove `identity` from the live room, if both exist.
    ///
    /// Returns true if a live session was removed.
    pub async fn leave_room(&self, room_id: &RoomId, identity: &str, record_leave: bool) -> bool {
        match self.get_room(room_id).await {
            Some(room) => room.leave(identity, None, record_leave).await,
            None => false,
        }
    }

    /// Tell the live room its meeting ended and wait for it to close.
    pub async fn end_room(&self, room_id: &RoomId) {
        if let Some(room) = self.get_room(room_id).await {
            room.end().await;
        }
    }

    pub async fn get_status(&self) -> Result<ControllerStatus, MeetError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| MeetError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| MeetError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the controller and every room (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token for tasks that must stop with the rooms (live connections).
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Cancel and wait up to `deadline` for every room to stop.
    ///
    /// Returns false if the deadline passed first.
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.cancel_token.cancel();
        tokio::time::timeout(deadline, self.stopped.cancelled())
            .await
            .is_ok()
    }
}

struct ManagedRoom {
    handle: RoomHandle,
    task_handle: JoinHandle<()>,
}

/// The `RoomControllerActor` implementation.
pub struct RoomControllerActor {
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Given to rooms so they can report `RoomClosed`. Weak so the actor
    /// exits once every external handle is gone and no room is live.
    self_sender: mpsc::WeakSender<ControllerMessage>,
    cancel_token: CancellationToken,
    stopped: CancellationToken,
    rooms: HashMap<RoomId, ManagedRoom>,
    next_generation: u64,
    registry: Arc<dyn MeetingRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    room_config: RoomConfig,
    accepting_new: bool,
    mailbox: MailboxMonitor,
}

impl RoomControllerActor {
    #[instrument(skip_all, name = "meet.actor.controller")]
    async fn run(mut self) {
        info!(target: "meet.actor.controller", "RoomControllerActor started");

        loop {
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "meet.actor.controller",
                        "RoomControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    let Some(message) = msg else {
                        info!(
                            target: "meet.actor.controller",
                            "RoomControllerActor channel closed, exiting"
                        );
                        break;
                    };
                    self.handle_message(message);
                    self.mailbox.record_processed(self.receiver.len());
                }
            }
        }

        info!(
            target: "meet.actor.controller",
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomControllerActor stopped"
        );
        self.stopped.cancel();
    }

    fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::GetOrCreateRoom {
                meeting_id,
                settings,
                respond_to,
            } => {
                let result = self.get_or_create_room(meeting_id, settings);
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let handle = self
                    .rooms
                    .get(&room_id)
                    .filter(|managed| !managed.handle.is_closed())
                    .map(|managed| managed.handle.clone());
                let _ = respond_to.send(handle);
            }

            ControllerMessage::RoomClosed {
                room_id,
                generation,
            } => {
                self.room_closed(&room_id, generation);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(ControllerStatus {
                    room_count: self.rooms.len(),
                    is_draining: !self.accepting_new,
                });
            }
        }
    }

    fn get_or_create_room(
        &mut self,
        meeting_id: MeetingId,
        settings: MeetingSettings,
    ) -> Result<RoomHandle, MeetError> {
        if !self.accepting_new {
            return Err(MeetError::Internal("Service is shutting down".to_string()));
        }

        let room_id = meeting_id.room_id();
        if let Some(managed) = self.rooms.get(&room_id) {
            if !managed.handle.is_closed() {
                return Ok(managed.handle.clone());
            }
        }

        let controller = self
            .self_sender
            .upgrade()
            .ok_or_else(|| MeetError::Internal("controller mailbox closed".to_string()))?;

        self.next_generation += 1;
        let (handle, task_handle) = RoomActor::spawn(
            meeting_id,
            self.next_generation,
            settings,
            self.room_config,
            Arc::clone(&self.registry),
            Arc::clone(&self.broadcaster),
            controller,
            self.cancel_token.child_token(),
        );

        // A closed predecessor may still be finishing; it keeps running
        // detached and its RoomClosed no longer matches.
        self.rooms.insert(
            room_id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        metrics::set_rooms_active(self.rooms.len());

        info!(
            target: "meet.actor.controller",
            room_id = %room_id,
            generation = self.next_generation,
            total_rooms = self.rooms.len(),
            "Room actor created"
        );

        Ok(handle)
    }

    fn room_closed(&mut self, room_id: &RoomId, generation: u64) {
        let current = self
            .rooms
            .get(room_id)
            .is_some_and(|managed| managed.handle.generation() == generation);

        if !current {
            debug!(
                target: "meet.actor.controller",
                room_id = %room_id,
                generation,
                "Ignoring RoomClosed from a superseded room"
            );
            return;
        }

        self.rooms.remove(room_id);
        metrics::set_rooms_active(self.rooms.len());

        info!(
            target: "meet.actor.controller",
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room actor removed"
        );
    }

    async fn graceful_shutdown(&mut self) {
        self.accepting_new = false;

        info!(
            target: "meet.actor.controller",
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        // Rooms run on child tokens and are already cancelled
        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(ROOM_SHUTDOWN_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "meet.actor.controller",
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "meet.actor.controller",
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "meet.actor.controller",
                        room_id = %room_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
        }
        metrics::set_rooms_active(0);

        info!(target: "meet.actor.controller", "Graceful shutdown complete");
    }

    /// Drop rooms whose task ended without reporting, logging panics.
    async fn check_room_health(&mut self) {
        let finished: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in finished {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };
            if let Err(join_error) = managed.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "meet.actor.controller",
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor panicked"
                    );
                }
            }
            metrics::set_rooms_active(self.rooms.len());
        }
    }
}
