//! HTTP request handlers for the meeting service.

pub mod health;
pub mod live;
pub mod meetings;
pub mod metrics;

pub use health::{health_check, readiness_check};
pub use live::live_connection;
pub use meetings::{
    cancel_meeting, chat_history, create_meeting, end_meeting, get_meeting, join_meeting,
    leave_meeting,
};
pub use metrics::metrics_handler;
