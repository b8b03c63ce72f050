//! # Meet Test Utilities
//!
//! Shared test utilities for the meeting service.
//!
//! This crate provides:
//! - Server test harness (`TestMeetServer` for E2E tests)
//! - Fixtures (valid identities, meeting request builder)
//! - Registry double (`SwitchableRegistry`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meet_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestMeetServer::spawn().await?;
//!     let meeting = server.create_meeting(TestMeeting::new(HOST)).await?;
//!     assert_eq!(meeting.room_id.as_str(), format!("room-{}", meeting.meeting_id));
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod mock_registry;
pub mod server_harness;

pub use fixtures::*;
pub use mock_registry::SwitchableRegistry;
pub use server_harness::TestMeetServer;
