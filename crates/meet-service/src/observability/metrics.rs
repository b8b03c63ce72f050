//! Metric definitions for the meeting service.
//!
//! Prometheus naming: `meet_` prefix, `_total` for counters, `_seconds`
//! for duration histograms.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the render handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("meet_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("meet_registry_operation".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set registry operation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `meet_http_requests_total`, `meet_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("meet_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("meet_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        101 | 200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Collapse meeting identifiers so label cardinality stays bounded.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        "/api/v1/live" => "/api/v1/live",
        "/api/v1/meetings" => "/api/v1/meetings",
        _ => {
            let Some(rest) = path.strip_prefix("/api/v1/meetings/") else {
                return "/other";
            };
            let mut parts = rest.split('/');
            let _meeting_id = parts.next();
            match (parts.next(), parts.next()) {
                (None, _) => "/api/v1/meetings/{id}",
                (Some("join"), None) => "/api/v1/meetings/{id}/join",
                (Some("leave"), None) => "/api/v1/meetings/{id}/leave",
                (Some("end"), None) => "/api/v1/meetings/{id}/end",
                (Some("cancel"), None) => "/api/v1/meetings/{id}/cancel",
                (Some("chat"), None) => "/api/v1/meetings/{id}/chat",
                _ => "/other",
            }
        }
    }
}

// ============================================================================
// Admission & Rooms
// ============================================================================

/// Record an admission decision.
///
/// Metric: `meet_admissions_total`
/// Labels: `outcome` (`admitted` or a `MeetError` code)
pub fn record_admission(outcome: &'static str) {
    counter!("meet_admissions_total", "outcome" => outcome).increment(1);
}

/// Set the number of live rooms.
///
/// Metric: `meet_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("meet_rooms_active").set(count as f64);
}

/// Record a participant entering a live room.
///
/// Metric: `meet_room_joins_total`, `meet_live_participants`
pub fn record_room_join() {
    counter!("meet_room_joins_total").increment(1);
    gauge!("meet_live_participants").increment(1.0);
}

/// Record a participant leaving a live room.
///
/// Metric: `meet_room_leaves_total`, `meet_live_participants`
pub fn record_room_leave() {
    counter!("meet_room_leaves_total").increment(1);
    gauge!("meet_live_participants").decrement(1.0);
}

// ============================================================================
// Signaling & Chat
// ============================================================================

/// Metric: `meet_signals_relayed_total`
pub fn record_signal_relayed(kind: &'static str) {
    counter!("meet_signals_relayed_total", "kind" => kind).increment(1);
}

/// Signal addressed to an identity that is not live in the room.
///
/// Metric: `meet_signals_dropped_total`
pub fn record_signal_dropped(kind: &'static str) {
    counter!("meet_signals_dropped_total", "kind" => kind).increment(1);
}

/// Metric: `meet_chat_messages_total`
pub fn record_chat_message(kind: &'static str) {
    counter!("meet_chat_messages_total", "kind" => kind).increment(1);
}

/// Metric: `meet_chat_persist_failures_total`
pub fn record_chat_persist_failure() {
    counter!("meet_chat_persist_failures_total").increment(1);
}

/// Outbound event dropped because a connection's queue was full or closed.
///
/// Metric: `meet_events_dropped_total`
pub fn record_event_dropped() {
    counter!("meet_events_dropped_total").increment(1);
}

// ============================================================================
// Registry
// ============================================================================

/// Record a registry operation.
///
/// Metric: `meet_registry_operation_duration_seconds`, `meet_registry_operations_total`
/// Labels: `operation`, `status` (success, rejected, error)
pub fn record_registry_operation(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("meet_registry_operation_duration_seconds",
        "operation" => operation
    )
    .record(duration.as_secs_f64());

    counter!("meet_registry_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

// ============================================================================
// Actors
// ============================================================================

/// Metric: `meet_actor_mailbox_depth`
/// Labels: `actor_type` (controller, room, connection)
pub fn set_actor_mailbox_depth(actor_type: &'static str, depth: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("meet_actor_mailbox_depth", "actor_type" => actor_type).set(depth as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint_bounds_meeting_ids() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/aB3dE5gH7jK9"),
            "/api/v1/meetings/{id}"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/aB3dE5gH7jK9/join"),
            "/api/v1/meetings/{id}/join"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/aB3dE5gH7jK9/chat"),
            "/api/v1/meetings/{id}/chat"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/meetings/aB3dE5gH7jK9/unknown"),
            "/other"
        );
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(101), "success");
        assert_eq!(categorize_status_code(409), "error");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_admission("admitted");
        record_room_join();
        record_room_leave();
        record_signal_dropped("offer");
        record_registry_operation("get_meeting", "success", Duration::from_millis(3));
        set_actor_mailbox_depth("room", 4);
    }
}
