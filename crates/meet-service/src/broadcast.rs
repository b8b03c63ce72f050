//! Outbound delivery from room actors to live connections.
//!
//! Room actors never touch a transport directly. They hold a
//! [`ConnectionHandle`] per member and push [`ServerEvent`]s through an
//! injected [`Broadcaster`], so room logic runs the same over WebSockets,
//! in-process channels or a recording test double.

use crate::events::ServerEvent;
use crate::observability::metrics;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;
use uuid::Uuid;

/// Outbound queue depth per connection.
pub const CONNECTION_OUTBOUND_BUFFER: usize = 256;

/// Addressable endpoint of one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    identity: String,
    connection_id: Uuid,
    sender: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(identity: impl Into<String>, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            identity: identity.into(),
            connection_id: Uuid::new_v4(),
            sender,
        }
    }

    /// Handle plus the receiving end of a fresh outbound queue.
    #[must_use]
    pub fn channel(identity: impl Into<String>) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (sender, receiver) = mpsc::channel(CONNECTION_OUTBOUND_BUFFER);
        (Self::new(identity, sender), receiver)
    }

    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// True once the connection's receiving side is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub(crate) fn sender(&self) -> &mpsc::Sender<ServerEvent> {
        &self.sender
    }
}

/// Delivery capability injected into room actors.
///
/// Implementations must not block: a room actor calls this while holding
/// its exclusive view of the member map.
pub trait Broadcaster: Send + Sync {
    /// Deliver `event` to one connection. Returns false if it was dropped.
    fn send_to(&self, target: &ConnectionHandle, event: ServerEvent) -> bool;

    /// Deliver a copy of `event` to every target.
    fn broadcast(&self, targets: &[&ConnectionHandle], event: &ServerEvent) {
        for target in targets {
            self.send_to(target, event.clone());
        }
    }
}

/// [`Broadcaster`] over each connection's bounded mpsc queue.
///
/// Full or closed queues drop the event rather than stall the room.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChannelBroadcaster;

impl Broadcaster for ChannelBroadcaster {
    fn send_to(&self, target: &ConnectionHandle, event: ServerEvent) -> bool {
        let event_name = event.name();
        match target.sender().try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                metrics::record_event_dropped();
                debug!(
                    target: "meet.broadcast",
                    identity = %target.identity(),
                    connection_id = %target.connection_id(),
                    event = event_name,
                    "Outbound queue full, event dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                metrics::record_event_dropped();
                debug!(
                    target: "meet.broadcast",
                    identity = %target.identity(),
                    connection_id = %target.connection_id(),
                    event = event_name,
                    "Connection closed, event dropped"
                );
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn left(identity: &str) -> ServerEvent {
        ServerEvent::MemberLeft {
            identity: identity.to_string(),
        }
    }

    #[tokio::test]
    async fn test_channel_broadcaster_delivers() {
        let (handle, mut rx) = ConnectionHandle::channel("alice");
        assert!(ChannelBroadcaster.send_to(&handle, left("bob")));
        assert_eq!(rx.recv().await.unwrap(), left("bob"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_target() {
        let (a, mut rx_a) = ConnectionHandle::channel("alice");
        let (b, mut rx_b) = ConnectionHandle::channel("bob");

        ChannelBroadcaster.broadcast(&[&a, &b], &left("carol"));

        assert_eq!(rx_a.recv().await.unwrap(), left("carol"));
        assert_eq!(rx_b.recv().await.unwrap(), left("carol"));
    }

    #[test]
    fn test_closed_connection_drops_without_error() {
        let (handle, rx) = ConnectionHandle::channel("alice");
        drop(rx);
        assert!(handle.is_closed());
        assert!(!ChannelBroadcaster.send_to(&handle, left("bob")));
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let (sender, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new("alice", sender);

        assert!(ChannelBroadcaster.send_to(&handle, left("bob")));
        assert!(!ChannelBroadcaster.send_to(&handle, left("carol")));
    }

    #[test]
    fn test_connection_ids_are_distinct() {
        let (a, _rx_a) = ConnectionHandle::channel("alice");
        let (b, _rx_b) = ConnectionHandle::channel("alice");
        assert_ne!(a.connection_id(), b.connection_id());
    }
}
