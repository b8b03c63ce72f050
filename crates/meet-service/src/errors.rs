//! Meeting service error types.
//!
//! Every error carries a stable string code that is returned both in HTTP
//! error bodies and in live-connection `error` events. Internal details are
//! logged server-side but never exposed to clients.

use crate::registry::RegistryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Meeting service error type.
///
/// Maps to HTTP status codes:
/// - `InvalidIdentity`, `BadRequest`: 400
/// - `InvalidPassword`, `Forbidden`, `NotAdmitted`: 403
/// - `MeetingNotFound`, `NotInRoom`: 404
/// - `MeetingEnded`, `RoomFull`, `Conflict`, `ChatDisabled`, `ScreenShareDisabled`: 409
/// - `PersistenceUnavailable`: 503
/// - `Internal`: 500
#[derive(Debug, Error)]
pub enum MeetError {
    /// Identity does not match the external account format.
    #[error("Invalid identity")]
    InvalidIdentity,

    /// Meeting does not exist.
    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),

    /// Meeting is ended or cancelled.
    #[error("Meeting has ended")]
    MeetingEnded,

    /// Supplied room password did not match.
    #[error("Invalid room password")]
    InvalidPassword,

    /// Meeting is at its participant limit.
    #[error("Room is full")]
    RoomFull,

    /// Caller lacks the role required for the action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The persistent store could not be reached.
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Request conflicts with the meeting's current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Live operation from a connection that has not joined the room.
    #[error("Not in room")]
    NotInRoom,

    /// Chat is disabled by meeting settings.
    #[error("Chat is disabled for this meeting")]
    ChatDisabled,

    /// Screen sharing is disabled by meeting settings.
    #[error("Screen sharing is disabled for this meeting")]
    ScreenShareDisabled,

    /// Live join attempted without passing admission first.
    #[error("Identity has not been admitted to this meeting")]
    NotAdmitted,

    /// Internal error (actor channel failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeetError {
    /// Stable error code shared by HTTP responses and live `error` events.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            MeetError::InvalidIdentity => "INVALID_IDENTITY",
            MeetError::MeetingNotFound(_) => "NOT_FOUND",
            MeetError::MeetingEnded => "MEETING_ENDED",
            MeetError::InvalidPassword => "INVALID_PASSWORD",
            MeetError::RoomFull => "ROOM_FULL",
            MeetError::Forbidden(_) => "FORBIDDEN",
            MeetError::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
            MeetError::BadRequest(_) => "BAD_REQUEST",
            MeetError::Conflict(_) => "CONFLICT",
            MeetError::NotInRoom => "NOT_IN_ROOM",
            MeetError::ChatDisabled => "CHAT_DISABLED",
            MeetError::ScreenShareDisabled => "SCREEN_SHARE_DISABLED",
            MeetError::NotAdmitted => "NOT_ADMITTED",
            MeetError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            MeetError::InvalidIdentity | MeetError::BadRequest(_) => StatusCode::BAD_REQUEST,
            MeetError::InvalidPassword | MeetError::Forbidden(_) | MeetError::NotAdmitted => {
                StatusCode::FORBIDDEN
            }
            MeetError::MeetingNotFound(_) | MeetError::NotInRoom => StatusCode::NOT_FOUND,
            MeetError::MeetingEnded
            | MeetError::RoomFull
            | MeetError::Conflict(_)
            | MeetError::ChatDisabled
            | MeetError::ScreenShareDisabled => StatusCode::CONFLICT,
            MeetError::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MeetError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            MeetError::PersistenceUnavailable(_) => {
                "Meeting storage is temporarily unavailable".to_string()
            }
            MeetError::Internal(_) => "An internal error occurred".to_string(),
            MeetError::MeetingNotFound(_) => "Meeting not found".to_string(),
            MeetError::Forbidden(reason)
            | MeetError::BadRequest(reason)
            | MeetError::Conflict(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

impl From<RegistryError> for MeetError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => MeetError::MeetingNotFound(id),
            RegistryError::AlreadyEnded => MeetError::MeetingEnded,
            RegistryError::Forbidden(reason) => MeetError::Forbidden(reason),
            RegistryError::Full => MeetError::RoomFull,
            RegistryError::Conflict(reason) => MeetError::Conflict(reason),
            RegistryError::Unavailable(reason) => MeetError::PersistenceUnavailable(reason),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for MeetError {
    fn into_response(self) -> Response {
        match &self {
            MeetError::PersistenceUnavailable(reason) => {
                tracing::error!(target: "meet.registry", reason = %reason, "Persistence unavailable");
            }
            MeetError::Internal(reason) => {
                tracing::error!(target: "meet.internal", reason = %reason, "Internal error");
            }
            _ => {}
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.client_message(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(MeetError::InvalidIdentity.error_code(), "INVALID_IDENTITY");
        assert_eq!(
            MeetError::MeetingNotFound("m".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(MeetError::MeetingEnded.error_code(), "MEETING_ENDED");
        assert_eq!(MeetError::InvalidPassword.error_code(), "INVALID_PASSWORD");
        assert_eq!(MeetError::RoomFull.error_code(), "ROOM_FULL");
        assert_eq!(
            MeetError::Forbidden("not host".to_string()).error_code(),
            "FORBIDDEN"
        );
        assert_eq!(
            MeetError::PersistenceUnavailable("db down".to_string()).error_code(),
            "PERSISTENCE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            MeetError::InvalidIdentity.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MeetError::InvalidPassword.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(MeetError::RoomFull.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            MeetError::PersistenceUnavailable(String::new()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = MeetError::PersistenceUnavailable("connection refused at 10.0.0.7:5432".into());
        assert!(!err.client_message().contains("10.0.0.7"));

        let err = MeetError::Internal("room mailbox closed".into());
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_registry_error_conversion() {
        assert!(matches!(
            MeetError::from(RegistryError::AlreadyEnded),
            MeetError::MeetingEnded
        ));
        assert!(matches!(
            MeetError::from(RegistryError::Unavailable("x".into())),
            MeetError::PersistenceUnavailable(_)
        ));
        assert!(matches!(
            MeetError::from(RegistryError::NotFound("m".into())),
            MeetError::MeetingNotFound(_)
        ));
        assert!(matches!(
            MeetError::from(RegistryError::Full),
            MeetError::RoomFull
        ));
    }

    #[tokio::test]
    async fn test_into_response_body_shape() {
        let response = MeetError::RoomFull.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "ROOM_FULL");
        assert_eq!(body["error"]["message"], "Room is full");
    }
}
