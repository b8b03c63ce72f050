//! Huddle meeting service library.
//!
//! Real-time meeting coordination:
//!
//! - Meeting registry: persistent meetings, rosters and chat history
//! - Admission: identity, lifecycle, password and capacity checks
//! - Live rooms: one actor per room owning members, presence and chat
//! - Signaling relay: point-to-point offer/answer/ICE forwarding
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> admission.rs / registry/*.rs
//!                              \-> actors/* (live rooms over WebSocket)
//! ```
//!
//! # Modules
//!
//! - `actors` - Room controller, room and connection actors
//! - `admission` - Admission checks
//! - `broadcast` - Outbound delivery to live connections
//! - `chat` - Chat replay ring and write-behind persistence
//! - `config` - Service configuration from environment
//! - `crypto` - Room password hashing
//! - `errors` - Error types with HTTP status code mapping
//! - `events` - Live-connection wire events
//! - `handlers` - HTTP request handlers
//! - `identity` - Identity format validation
//! - `middleware` - HTTP middleware
//! - `models` - Data models
//! - `observability` - Metrics and health state
//! - `registry` - Meeting registry trait and stores
//! - `routes` - Axum router setup
//! - `signaling` - Signaling relay

pub mod actors;
pub mod admission;
pub mod broadcast;
pub mod chat;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod registry;
pub mod routes;
pub mod signaling;
