//! Admission Controller.
//!
//! Decides whether an identity may enter a meeting and, if so, records the
//! join in the registry. Checks run in a fixed order and every failure
//! returns before any write, so a rejected admission leaves both the roster
//! and the live room untouched. No live room state is consulted here.

use crate::crypto;
use crate::errors::MeetError;
use crate::identity;
use crate::models::{MeetingSnapshot, NewParticipant, ParticipantRecord};
use crate::observability::metrics;
use crate::registry::MeetingRegistry;

use common::secret::SecretString;
use common::types::{MeetingId, RoomId};
use tracing::{debug, info, instrument};

/// Maximum display name length.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 100;

/// Who is asking to get in.
#[derive(Debug)]
pub struct AdmissionRequest {
    pub identity: String,
    pub display_name: String,
    pub email: String,
    pub password: Option<SecretString>,
}

/// Successful admission.
#[derive(Debug, Clone)]
pub struct Admission {
    pub room_id: RoomId,
    pub meeting: MeetingSnapshot,
    pub participant: ParticipantRecord,
}

/// Run the admission checks for `request` against `meeting_id`.
///
/// Order: identity format, meeting exists, meeting open, password,
/// capacity, then the roster write. The registry repeats the capacity
/// check atomically with the write, which settles concurrent joins.
///
/// # Errors
///
/// `InvalidIdentity`, `BadRequest`, `MeetingNotFound`, `MeetingEnded`,
/// `InvalidPassword`, `RoomFull`, or `PersistenceUnavailable`.
#[instrument(skip_all, name = "meet.admission.admit", fields(meeting_id = %meeting_id))]
pub async fn admit(
    registry: &dyn MeetingRegistry,
    meeting_id: &MeetingId,
    request: AdmissionRequest,
) -> Result<Admission, MeetError> {
    let result = run_checks(registry, meeting_id, request).await;

    match &result {
        Ok(admission) => {
            metrics::record_admission("admitted");
            info!(
                target: "meet.admission",
                meeting_id = %meeting_id,
                identity = %admission.participant.identity,
                role = admission.participant.role.as_str(),
                "Participant admitted"
            );
        }
        Err(e) => {
            metrics::record_admission(e.error_code());
            debug!(
                target: "meet.admission",
                meeting_id = %meeting_id,
                code = e.error_code(),
                "Admission rejected"
            );
        }
    }

    result
}

async fn run_checks(
    registry: &dyn MeetingRegistry,
    meeting_id: &MeetingId,
    request: AdmissionRequest,
) -> Result<Admission, MeetError> {
    if !identity::validate(&request.identity) {
        return Err(MeetError::InvalidIdentity);
    }

    let display_name = request.display_name.trim();
    if display_name.is_empty() {
        return Err(MeetError::BadRequest(
            "displayName must not be empty".to_string(),
        ));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(MeetError::BadRequest(format!(
            "displayName must be at most {MAX_DISPLAY_NAME_LENGTH} characters"
        )));
    }

    let meeting = registry.get_meeting(meeting_id).await?;

    if meeting.status.is_closed() {
        return Err(MeetError::MeetingEnded);
    }

    if let Some(hash) = &meeting.password_hash {
        let supplied = request.password.as_ref().ok_or(MeetError::InvalidPassword)?;
        if !crypto::verify_password(supplied, hash).await? {
            return Err(MeetError::InvalidPassword);
        }
    }

    // A rejoin while still active reuses its roster entry, so it does not
    // count against the limit. Fast path only; record_join decides.
    let active = registry.active_participant_count(meeting_id).await?;
    let rejoining = registry
        .is_active_participant(meeting_id, &request.identity)
        .await?;
    let occupied = active.saturating_sub(u32::from(rejoining));
    if occupied >= meeting.settings.max_participants {
        return Err(MeetError::RoomFull);
    }

    let participant = registry
        .record_join(
            meeting_id,
            NewParticipant {
                identity: request.identity,
                display_name: display_name.to_string(),
                email: request.email,
            },
        )
        .await?;

    // Status may have moved scheduled -> active on this join
    let meeting = registry.get_meeting(meeting_id).await?;

    Ok(Admission {
        room_id: meeting.room_id(),
        meeting: meeting.snapshot(),
        participant,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{MeetingSettings, MeetingStatus, NewMeeting};
    use crate::registry::InMemoryMeetingRegistry;
    use std::sync::Arc;

    const HOST: &str = "hostaaaaaaaaaaaaaaaaaaaa";
    const ALICE: &str = "aliceaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "bobaaaaaaaaaaaaaaaaaaaaa";
    const CAROL: &str = "carolaaaaaaaaaaaaaaaaaaa";

    async fn meeting(
        registry: &InMemoryMeetingRegistry,
        max: u32,
        password: Option<&str>,
    ) -> MeetingId {
        let password_hash = match password {
            Some(p) => Some(
                crypto::hash_password(&SecretString::from(p), crypto::MIN_BCRYPT_COST)
                    .await
                    .unwrap(),
            ),
            None => None,
        };
        registry
            .create_meeting(NewMeeting {
                title: "Admission".to_string(),
                description: None,
                creator_identity: HOST.to_string(),
                settings: MeetingSettings::with_limit(max),
                password_hash,
            })
            .await
            .unwrap()
            .meeting_id
    }

    fn request(identity: &str, password: Option<&str>) -> AdmissionRequest {
        AdmissionRequest {
            identity: identity.to_string(),
            display_name: identity.to_uppercase(),
            email: String::new(),
            password: password.map(SecretString::from),
        }
    }

    #[tokio::test]
    async fn test_admits_and_activates_meeting() {
        let registry = InMemoryMeetingRegistry::new();
        let id = meeting(&registry, 6, None).await;

        let admission = admit(&registry, &id, request(ALICE, None)).await.unwrap();

        assert_eq!(admission.room_id, id.room_id());
        assert_eq!(admission.meeting.status, MeetingStatus::Active);
        assert_eq!(admission.participant.identity, ALICE);
        assert!(registry.is_active_participant(&id, ALICE).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_identity_checked_first() {
        let registry = InMemoryMeetingRegistry::new();
        let missing = MeetingId::new("missing");

        let err = admit(&registry, &missing, request("short", None))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::InvalidIdentity));

        let err = admit(&registry, &missing, request(ALICE, None))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::MeetingNotFound(_)));
    }

    #[tokio::test]
    async fn test_password_and_capacity_scenario() {
        let registry = InMemoryMeetingRegistry::new();
        let id = meeting(&registry, 2, Some("abc123")).await;

        let err = admit(&registry, &id, request(ALICE, None)).await.unwrap_err();
        assert!(matches!(err, MeetError::InvalidPassword));

        let err = admit(&registry, &id, request(ALICE, Some("wrong")))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::InvalidPassword));

        admit(&registry, &id, request(ALICE, Some("abc123")))
            .await
            .unwrap();
        admit(&registry, &id, request(BOB, Some("abc123")))
            .await
            .unwrap();

        let err = admit(&registry, &id, request(CAROL, Some("abc123")))
            .await
            .unwrap_err();
        assert!(matches!(err, MeetError::RoomFull));
    }

    #[tokio::test]
    async fn test_rejected_admission_leaves_roster_untouched() {
        let registry = InMemoryMeetingRegistry::new();
        let id = meeting(&registry, 2, Some("abc123")).await;

        let _ = admit(&registry, &id, request(ALICE, Some("nope"))).await;

        assert!(registry.roster(&id).await.unwrap().is_empty());
        let meeting = registry.get_meeting(&id).await.unwrap();
        assert_eq!(meeting.status, MeetingStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_rejoin_does_not_count_against_limit() {
        let registry = InMemoryMeetingRegistry::new();
        let id = meeting(&registry, 1, None).await;

        admit(&registry, &id, request(ALICE, None)).await.unwrap();
        admit(&registry, &id, request(ALICE, None)).await.unwrap();

        let err = admit(&registry, &id, request(BOB, None)).await.unwrap_err();
        assert!(matches!(err, MeetError::RoomFull));
        assert_eq!(registry.active_participant_count(&id).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_respect_limit() {
        let registry = Arc::new(InMemoryMeetingRegistry::new());
        let id = meeting(&registry, 3, None).await;

        let tasks: Vec<_> = (0..24)
            .map(|n| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move {
                    let identity = format!("user{n:02}aaaaaaaaaaaaaaaaaa");
                    admit(registry.as_ref(), &id, request(&identity, None)).await
                })
            })
            .collect();

        let mut admitted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(e) => assert!(matches!(e, MeetError::RoomFull), "unexpected {e:?}"),
            }
        }

        assert_eq!(admitted, 3);
        assert_eq!(registry.active_participant_count(&id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ended_meeting_rejects() {
        let registry = InMemoryMeetingRegistry::new();
        let id = meeting(&registry, 6, None).await;

        admit(&registry, &id, request(HOST, None)).await.unwrap();
        registry.end_meeting(&id, HOST).await.unwrap();

        let err = admit(&registry, &id, request(ALICE, None)).await.unwrap_err();
        assert!(matches!(err, MeetError::MeetingEnded));
    }

    #[tokio::test]
    async fn test_blank_display_name_rejected() {
        let registry = InMemoryMeetingRegistry::new();
        let id = meeting(&registry, 6, None).await;

        let mut req = request(ALICE, None);
        req.display_name = "   ".to_string();
        let err = admit(&registry, &id, req).await.unwrap_err();
        assert!(matches!(err, MeetError::BadRequest(_)));
    }
}
