//! Meeting handlers.
//!
//! - `POST /api/v1/meetings` - Create meeting
//! - `GET /api/v1/meetings/{id}` - Public meeting info
//! - `POST /api/v1/meetings/{id}/join` - Admission
//! - `POST /api/v1/meetings/{id}/leave` - Leave (roster and live room)
//! - `POST /api/v1/meetings/{id}/end` - End meeting (host only)
//! - `POST /api/v1/meetings/{id}/cancel` - Cancel scheduled meeting (host only)
//! - `GET /api/v1/meetings/{id}/chat` - Persisted chat, newest first
//!
//! Request bodies are decoded by hand so malformed JSON is a 400 with the
//! service's error body rather than axum's default rejection.

use crate::admission::{self, AdmissionRequest};
use crate::chat::ChatMessage;
use crate::config::MAX_PARTICIPANTS_CEILING;
use crate::crypto;
use crate::errors::MeetError;
use crate::identity;
use crate::models::{
    ChatHistoryQuery, CreateMeetingRequest, CreateMeetingResponse, HostActionRequest,
    JoinMeetingRequest, JoinMeetingResponse, LeaveMeetingRequest, MeetingInfoResponse,
    MeetingSettings, NewMeeting,
};
use crate::routes::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common::secret::ExposeSecret;
use common::types::MeetingId;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{info, instrument};

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, MeetError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "meet.handlers.meetings", error = %e, "Invalid request body");
        MeetError::BadRequest("Invalid request body".to_string())
    })
}

// ============================================================================
// Handler: POST /api/v1/meetings
// ============================================================================

/// Create a meeting in `scheduled` state. The creator becomes host.
///
/// # Response
///
/// - 201 Created: `{meetingId, roomId}`
/// - 400 Bad Request: invalid body, settings or creator identity
/// - 503 Service Unavailable: registry unreachable
#[instrument(skip_all, name = "meet.meeting.create")]
pub async fn create_meeting(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<CreateMeetingResponse>), MeetError> {
    let request: CreateMeetingRequest = decode(&body)?;

    if !identity::validate(&request.creator_identity) {
        return Err(MeetError::InvalidIdentity);
    }
    request.validate().map_err(MeetError::BadRequest)?;

    let input = request.settings.unwrap_or_default();
    let max_participants = input.max_participants.unwrap_or(state.config.max_participants);
    if !(1..=MAX_PARTICIPANTS_CEILING).contains(&max_participants) {
        return Err(MeetError::BadRequest(format!(
            "maxParticipants must be between 1 and {MAX_PARTICIPANTS_CEILING}"
        )));
    }
    let settings = MeetingSettings {
        max_participants,
        allow_chat: input.allow_chat.unwrap_or(true),
        allow_screen_share: input.allow_screen_share.unwrap_or(true),
    };

    // A blank password means no password
    let password_hash = match request
        .password
        .as_ref()
        .filter(|p| !p.expose_secret().is_empty())
    {
        Some(password) => Some(crypto::hash_password(password, state.config.bcrypt_cost).await?),
        None => None,
    };

    let meeting = state
        .registry
        .create_meeting(NewMeeting {
            title: request.title.trim().to_string(),
            description: request.description,
            creator_identity: request.creator_identity,
            settings,
            password_hash,
        })
        .await?;

    info!(
        target: "meet.handlers.meetings",
        meeting_id = %meeting.meeting_id,
        max_participants = settings.max_participants,
        requires_password = meeting.requires_password(),
        "Meeting created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateMeetingResponse {
            room_id: meeting.room_id(),
            meeting_id: meeting.meeting_id,
        }),
    ))
}

// ============================================================================
// Handler: GET /api/v1/meetings/{id}
// ============================================================================

/// Public view of a meeting. Never includes the password hash.
#[instrument(skip_all, name = "meet.meeting.get", fields(meeting_id = %meeting_id))]
pub async fn get_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
) -> Result<Json<MeetingInfoResponse>, MeetError> {
    let meeting_id = MeetingId::new(meeting_id);
    let info = state.registry.get_meeting_info(&meeting_id).await?;
    Ok(Json(info))
}

// ============================================================================
// Handler: POST /api/v1/meetings/{id}/join
// ============================================================================

/// Run admission. On success the identity may open a live connection and
/// send `join-room` for the returned room.
///
/// # Response
///
/// - 200 OK: `{roomId, meeting, participant}`
/// - 400 `INVALID_IDENTITY` / `BAD_REQUEST`
/// - 403 `INVALID_PASSWORD`
/// - 404 `NOT_FOUND`
/// - 409 `MEETING_ENDED` / `ROOM_FULL`
/// - 503 `PERSISTENCE_UNAVAILABLE`
#[instrument(skip_all, name = "meet.meeting.join", fields(meeting_id = %meeting_id))]
pub async fn join_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<JoinMeetingResponse>, MeetError> {
    let request: JoinMeetingRequest = decode(&body)?;
    let meeting_id = MeetingId::new(meeting_id);

    let admission = admission::admit(
        state.registry.as_ref(),
        &meeting_id,
        AdmissionRequest {
            identity: request.identity,
            display_name: request.display_name,
            email: request.email,
            password: request.password,
        },
    )
    .await?;

    Ok(Json(JoinMeetingResponse {
        room_id: admission.room_id,
        meeting: admission.meeting,
        participant: admission.participant,
    }))
}

// ============================================================================
// Handler: POST /api/v1/meetings/{id}/leave
// ============================================================================

/// Close the identity's roster entry and drop any live session it holds.
///
/// Idempotent: leaving twice is not an error.
#[instrument(skip_all, name = "meet.meeting.leave", fields(meeting_id = %meeting_id))]
pub async fn leave_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<StatusCode, MeetError> {
    let request: LeaveMeetingRequest = decode(&body)?;
    if !identity::validate(&request.identity) {
        return Err(MeetError::InvalidIdentity);
    }
    let meeting_id = MeetingId::new(meeting_id);

    state
        .registry
        .record_leave(&meeting_id, &request.identity)
        .await?;

    // Roster already updated above
    let was_live = state
        .rooms
        .leave_room(&meeting_id.room_id(), &request.identity, false)
        .await;

    info!(
        target: "meet.handlers.meetings",
        meeting_id = %meeting_id,
        was_live,
        "Participant left meeting"
    );

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Handler: POST /api/v1/meetings/{id}/end
// ============================================================================

/// End an active meeting. Host only.
///
/// Every live member receives `meeting-ended`, the room flushes its chat and
/// closes before this returns.
///
/// # Response
///
/// - 200 OK: meeting info with status `ended`
/// - 403 `FORBIDDEN`: requester is not the host
/// - 409 `MEETING_ENDED` / `CONFLICT` (meeting never started)
#[instrument(skip_all, name = "meet.meeting.end", fields(meeting_id = %meeting_id))]
pub async fn end_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<MeetingInfoResponse>, MeetError> {
    let request: HostActionRequest = decode(&body)?;
    let meeting_id = MeetingId::new(meeting_id);

    let meeting = state
        .registry
        .end_meeting(&meeting_id, &request.requester_identity)
        .await?;

    state.rooms.end_room(&meeting.room_id()).await;

    // Read back after the room closed so the count reflects the roster
    let info = state.registry.get_meeting_info(&meeting_id).await?;

    info!(
        target: "meet.handlers.meetings",
        meeting_id = %meeting_id,
        "Meeting ended"
    );

    Ok(Json(info))
}

// ============================================================================
// Handler: POST /api/v1/meetings/{id}/cancel
// ============================================================================

/// Cancel a meeting that has not started. Host only.
#[instrument(skip_all, name = "meet.meeting.cancel", fields(meeting_id = %meeting_id))]
pub async fn cancel_meeting(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<MeetingInfoResponse>, MeetError> {
    let request: HostActionRequest = decode(&body)?;
    let meeting_id = MeetingId::new(meeting_id);

    let meeting = state
        .registry
        .cancel_meeting(&meeting_id, &request.requester_identity)
        .await?;

    info!(
        target: "meet.handlers.meetings",
        meeting_id = %meeting_id,
        "Meeting cancelled"
    );

    Ok(Json(meeting.info(0)))
}

// ============================================================================
// Handler: GET /api/v1/meetings/{id}/chat
// ============================================================================

/// Persisted chat, newest first.
///
/// `limit` defaults to `CHAT_HISTORY_DEFAULT_LIMIT` and is capped at
/// `CHAT_HISTORY_MAX_LIMIT`.
#[instrument(skip_all, name = "meet.meeting.chat_history", fields(meeting_id = %meeting_id))]
pub async fn chat_history(
    State(state): State<Arc<AppState>>,
    Path(meeting_id): Path<String>,
    Query(query): Query<ChatHistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, MeetError> {
    let limit = history_limit(
        query.limit,
        state.config.chat_history_default_limit,
        state.config.chat_history_max_limit,
    )?;
    let meeting_id = MeetingId::new(meeting_id);

    let messages = state.registry.get_chat_history(&meeting_id, limit).await?;
    Ok(Json(messages))
}

fn history_limit(requested: Option<usize>, default: u32, max: u32) -> Result<usize, MeetError> {
    let max = usize::try_from(max).unwrap_or(usize::MAX);
    match requested {
        None => Ok(usize::try_from(default).unwrap_or(max).min(max)),
        Some(0) => Err(MeetError::BadRequest(
            "limit must be greater than 0".to_string(),
        )),
        Some(n) => Ok(n.min(max)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_history_limit_defaults_and_caps() {
        assert_eq!(history_limit(None, 50, 500).unwrap(), 50);
        assert_eq!(history_limit(Some(10), 50, 500).unwrap(), 10);
        assert_eq!(history_limit(Some(10_000), 50, 500).unwrap(), 500);
        assert!(matches!(
            history_limit(Some(0), 50, 500),
            Err(MeetError::BadRequest(_))
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_body() {
        let err = decode::<LeaveMeetingRequest>(b"{not json").unwrap_err();
        assert!(matches!(err, MeetError::BadRequest(_)));

        let request: LeaveMeetingRequest =
            decode(br#"{"identity":"aliceaaaaaaaaaaaaaaaaaaa"}"#).unwrap();
        assert_eq!(request.identity, "aliceaaaaaaaaaaaaaaaaaaa");
    }
}
