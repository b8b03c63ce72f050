//! Observability for the meeting service.
//!
//! Metrics are exposed through the `metrics` facade and rendered by the
//! Prometheus exporter at `/metrics`. Labels are bounded:
//! - `actor_type`: 3 values (controller, room, connection)
//! - `outcome`: admission outcomes, bounded by `MeetError` codes
//! - `operation`: registry trait methods
//! - `status`: success, rejected, error
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `meet_admissions_total` | Counter | `outcome` |
//! | `meet_rooms_active` | Gauge | none |
//! | `meet_live_participants` | Gauge | none |
//! | `meet_room_joins_total` / `meet_room_leaves_total` | Counter | none |
//! | `meet_signals_relayed_total` / `meet_signals_dropped_total` | Counter | `kind` |
//! | `meet_chat_messages_total` | Counter | `kind` |
//! | `meet_chat_persist_failures_total` | Counter | none |
//! | `meet_registry_operation_duration_seconds` | Histogram | `operation`, `status` |
//! | `meet_actor_mailbox_depth` | Gauge | `actor_type` |

pub mod health;
pub mod metrics;

pub use health::HealthState;
pub use metrics::init_metrics_recorder;
