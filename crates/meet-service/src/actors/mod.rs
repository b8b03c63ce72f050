//! Actor model for live rooms.
//!
//! ```text
//! RoomControllerActor (singleton)
//! └── hands out handles to N RoomActors
//!     └── RoomActor (one per live room)
//!         ├── owns members, presence and the chat ring
//!         └── pushes events to ConnectionHandles
//!
//! ConnectionActor (one per live client connection)
//! └── member of at most one RoomActor at a time
//! ```
//!
//! # Key Design Decisions
//!
//! - **Room actor owns room state**: no locks; mutations are serialized by
//!   its mailbox, so concurrent joins cannot overshoot capacity
//! - **Rooms never await I/O in their loop**: leave records and chat
//!   persistence run on background tasks
//! - **CancellationToken propagation**: rooms and connections run on
//!   child tokens of the controller's root token
//! - **Generation-tagged rooms**: a room that closed while a join was in
//!   flight is replaced, never resurrected
//!
//! # Modules
//!
//! - [`controller`] - `RoomControllerActor`, room lookup and lifecycle
//! - [`room`] - `RoomActor` per live room
//! - [`connection`] - `ConnectionActor` per live client
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring

pub mod connection;
pub mod controller;
pub mod messages;
pub mod metrics;
pub mod room;

pub use connection::{ConnectionActor, ConnectionActorHandle, InboundFrame};
pub use controller::{RoomControllerActor, RoomControllerHandle};
pub use messages::*;
pub use metrics::{ActorType, MailboxMonitor};
pub use room::{JoinError, RoomActor, RoomConfig, RoomHandle};
