//! Signaling relay.
//!
//! Offers, answers and ICE candidates are forwarded point-to-point between
//! two members of the same room. The payload is opaque: it is never parsed,
//! validated or fanned out. Envelopes addressed to an identity that is not
//! live are dropped without an error to the sender.

use crate::broadcast::{Broadcaster, ConnectionHandle};
use crate::events::ServerEvent;
use crate::observability::metrics;

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

/// A signaling message in flight between two room members.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingEnvelope {
    pub kind: SignalKind,
    pub sender_identity: String,
    pub target_identity: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    /// Target is not live in the room.
    TargetAbsent,
    /// Target is live but its outbound queue rejected the event.
    Undeliverable,
}

/// Forward `envelope` to `target`, stamping the relay time.
///
/// `target` is the live connection registered for
/// `envelope.target_identity`, looked up by the caller inside the room actor.
pub fn relay(
    target: Option<&ConnectionHandle>,
    envelope: SignalingEnvelope,
    broadcaster: &dyn Broadcaster,
) -> RelayOutcome {
    let kind = envelope.kind.as_str();

    let Some(target) = target else {
        metrics::record_signal_dropped(kind);
        return RelayOutcome::TargetAbsent;
    };

    let event = ServerEvent::Signal {
        kind: envelope.kind,
        sender_identity: envelope.sender_identity,
        payload: envelope.payload,
        timestamp: Utc::now(),
    };

    if broadcaster.send_to(target, event) {
        metrics::record_signal_relayed(kind);
        RelayOutcome::Delivered
    } else {
        metrics::record_signal_dropped(kind);
        RelayOutcome::Undeliverable
    }
}
