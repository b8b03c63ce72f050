//! Mailbox monitoring for actors.
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Controller | < 100  | 100-500 | > 500    |
//! | Room       | < 100  | 100-500 | > 500    |
//! | Connection | < 50   | 50-200  | > 200    |

use crate::observability::metrics;

use tracing::{debug, warn};

pub const ROOM_MAILBOX_NORMAL: usize = 100;
pub const ROOM_MAILBOX_WARNING: usize = 500;

pub const CONNECTION_MAILBOX_NORMAL: usize = 50;
pub const CONNECTION_MAILBOX_WARNING: usize = 200;

/// Actor type for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `RoomControllerActor` (singleton).
    Controller,
    /// `RoomActor` (one per live room).
    Room,
    /// `ConnectionActor` (one per live connection).
    Connection,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Controller => "controller",
            ActorType::Room => "room",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Controller | ActorType::Room => ROOM_MAILBOX_WARNING,
            ActorType::Connection => CONNECTION_MAILBOX_WARNING,
        }
    }

    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Controller | ActorType::Room => ROOM_MAILBOX_NORMAL,
            ActorType::Connection => CONNECTION_MAILBOX_NORMAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Tracks mailbox depth for one actor.
///
/// Owned by the actor it monitors; the actor reports the queue length it
/// observes each time it dequeues a message.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    level: MailboxLevel,
    peak_depth: usize,
    messages_processed: u64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            level: MailboxLevel::Normal,
            peak_depth: 0,
            messages_processed: 0,
        }
    }

    /// Record one processed message with `depth` messages still queued.
    pub fn record_processed(&mut self, depth: usize) {
        self.messages_processed += 1;
        self.peak_depth = self.peak_depth.max(depth);
        metrics::set_actor_mailbox_depth(self.actor_type.as_str(), depth);

        let level = self.level_for_depth(depth);
        if level != self.level {
            match level {
                MailboxLevel::Critical => warn!(
                    target: "meet.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth,
                    threshold = self.actor_type.warning_threshold(),
                    "Mailbox depth critical"
                ),
                MailboxLevel::Warning => debug!(
                    target: "meet.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth,
                    "Mailbox depth elevated"
                ),
                MailboxLevel::Normal => {}
            }
            self.level = level;
        }
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_type_labels_and_thresholds() {
        assert_eq!(ActorType::Controller.as_str(), "controller");
        assert_eq!(ActorType::Room.as_str(), "room");
        assert_eq!(ActorType::Connection.as_str(), "connection");
        assert_eq!(ActorType::Room.normal_threshold(), 100);
        assert_eq!(ActorType::Connection.warning_threshold(), 200);
    }

    #[test]
    fn test_monitor_tracks_levels_and_peak() {
        let mut monitor = MailboxMonitor::new(ActorType::Room, "room-abc");
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        monitor.record_processed(150);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        monitor.record_processed(600);
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);

        monitor.record_processed(3);
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);
        assert_eq!(monitor.peak_depth(), 600);
        assert_eq!(monitor.messages_processed(), 3);
    }

    #[test]
    fn test_connection_thresholds_are_tighter() {
        let mut monitor = MailboxMonitor::new(ActorType::Connection, "conn");
        monitor.record_processed(75);
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);
        monitor.record_processed(201);
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);
    }
}
