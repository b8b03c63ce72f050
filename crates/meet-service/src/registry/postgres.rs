//! PostgreSQL meeting registry.
//!
//! All queries are parameterized runtime queries. State transitions that
//! depend on the current meeting status (`record_join`, `end_meeting`,
//! `cancel_meeting`) lock the meeting row with `FOR UPDATE` inside a
//! transaction so concurrent callers observe a single order.

use super::{ensure_host, generate_meeting_code, role_for, MeetingRegistry, RegistryError};
use crate::chat::{ChatKind, ChatMessage};
use crate::models::{
    Meeting, MeetingSettings, MeetingStatus, NewMeeting, NewParticipant, ParticipantRecord,
    ParticipantRole,
};
use crate::observability::metrics;

use async_trait::async_trait;
use common::types::{MeetingId, RoomId};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::time::Instant;
use tracing::instrument;

/// Attempts at finding an unused meeting code before giving up.
const MAX_CODE_ATTEMPTS: usize = 3;

const MEETING_COLUMNS: &str = "meeting_id, title, description, creator_identity, host_identity, \
     status, max_participants, allow_chat, allow_screen_share, password_hash, \
     created_at, started_at, ended_at";

const PARTICIPANT_COLUMNS: &str =
    "identity, display_name, email, role, joined_at, left_at, is_active";

/// [`MeetingRegistry`] backed by a PostgreSQL pool.
#[derive(Clone)]
pub struct PgMeetingRegistry {
    pool: PgPool,
}

impl PgMeetingRegistry {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, RegistryError> {
        Ok(self.pool.begin().await?)
    }
}

/// Run a registry operation, recording its latency and outcome.
async fn timed<T, F>(operation: &'static str, fut: F) -> Result<T, RegistryError>
where
    F: Future<Output = Result<T, RegistryError>>,
{
    let start = Instant::now();
    let result = fut.await;
    let status = match &result {
        Ok(_) => "success",
        Err(RegistryError::Unavailable(_)) => "error",
        Err(_) => "rejected",
    };
    metrics::record_registry_operation(operation, status, start.elapsed());
    result
}

fn decode_err(column: &str, detail: impl std::fmt::Display) -> RegistryError {
    RegistryError::Unavailable(format!("Invalid value in column {column}: {detail}"))
}

fn map_meeting_row(row: &PgRow) -> Result<Meeting, RegistryError> {
    let status: String = row.try_get("status")?;
    let max_participants: i32 = row.try_get("max_participants")?;

    Ok(Meeting {
        meeting_id: MeetingId(row.try_get("meeting_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        creator_identity: row.try_get("creator_identity")?,
        host_identity: row.try_get("host_identity")?,
        status: status
            .parse::<MeetingStatus>()
            .map_err(|e| decode_err("status", e))?,
        settings: MeetingSettings {
            max_participants: u32::try_from(max_participants)
                .map_err(|e| decode_err("max_participants", e))?,
            allow_chat: row.try_get("allow_chat")?,
            allow_screen_share: row.try_get("allow_screen_share")?,
        },
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn map_participant_row(row: &PgRow) -> Result<ParticipantRecord, RegistryError> {
    let role: String = row.try_get("role")?;

    Ok(ParticipantRecord {
        identity: row.try_get("identity")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        joined_at: row.try_get("joined_at")?,
        left_at: row.try_get("left_at")?,
        role: role
            .parse::<ParticipantRole>()
            .map_err(|e| decode_err("role", e))?,
        is_active: row.try_get("is_active")?,
    })
}

fn map_chat_row(row: &PgRow) -> Result<ChatMessage, RegistryError> {
    let kind: String = row.try_get("kind")?;

    Ok(ChatMessage {
        id: row.try_get("message_id")?,
        room_id: RoomId(row.try_get("room_id")?),
        sender_identity: row.try_get("sender_identity")?,
        sender_name: row.try_get("sender_name")?,
        body: row.try_get("body")?,
        timestamp: row.try_get("sent_at")?,
        kind: match kind.as_str() {
            "text" => ChatKind::Text,
            "system" => ChatKind::System,
            other => return Err(decode_err("kind", other)),
        },
    })
}

/// Lock and load a meeting row within `tx`.
async fn lock_meeting(
    tx: &mut Transaction<'static, Postgres>,
    meeting_id: &MeetingId,
) -> Result<Meeting, RegistryError> {
    let row = sqlx::query(&format!(
        "SELECT {MEETING_COLUMNS} FROM meetings WHERE meeting_id = $1 FOR UPDATE"
    ))
    .bind(meeting_id.as_str())
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| RegistryError::NotFound(meeting_id.to_string()))?;

    map_meeting_row(&row)
}

async fn ensure_meeting_exists(pool: &PgPool, meeting_id: &MeetingId) -> Result<(), RegistryError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM meetings WHERE meeting_id = $1)")
            .bind(meeting_id.as_str())
            .fetch_one(pool)
            .await?;

    if exists {
        Ok(())
    } else {
        Err(RegistryError::NotFound(meeting_id.to_string()))
    }
}

#[async_trait]
impl MeetingRegistry for PgMeetingRegistry {
    #[instrument(skip_all, name = "meet.registry.create_meeting")]
    async fn create_meeting(&self, new_meeting: NewMeeting) -> Result<Meeting, RegistryError> {
        timed("create_meeting", async {
            let max_participants = i32::try_from(new_meeting.settings.max_participants)
                .map_err(|e| RegistryError::Conflict(format!("maxParticipants out of range: {e}")))?;

            for _ in 0..MAX_CODE_ATTEMPTS {
                let meeting_id = generate_meeting_code()?;

                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO meetings (
                        meeting_id, title, description, creator_identity, host_identity,
                        status, max_participants, allow_chat, allow_screen_share, password_hash
                    )
                    VALUES ($1, $2, $3, $4, $4, 'scheduled', $5, $6, $7, $8)
                    ON CONFLICT (meeting_id) DO NOTHING
                    RETURNING {MEETING_COLUMNS}
                    "#
                ))
                .bind(meeting_id.as_str()) // $1
                .bind(&new_meeting.title) // $2
                .bind(&new_meeting.description) // $3
                .bind(&new_meeting.creator_identity) // $4
                .bind(max_participants) // $5
                .bind(new_meeting.settings.allow_chat) // $6
                .bind(new_meeting.settings.allow_screen_share) // $7
                .bind(&new_meeting.password_hash) // $8
                .fetch_optional(&self.pool)
                .await?;

                if let Some(row) = row {
                    return map_meeting_row(&row);
                }

                tracing::warn!(target: "meet.registry", "Meeting code collision, retrying");
            }

            Err(RegistryError::Unavailable(
                "Could not allocate a unique meeting code".to_string(),
            ))
        })
        .await
    }

    #[instrument(skip_all, name = "meet.registry.get_meeting", fields(meeting_id = %meeting_id))]
    async fn get_meeting(&self, meeting_id: &MeetingId) -> Result<Meeting, RegistryError> {
        timed("get_meeting", async {
            let row = sqlx::query(&format!(
                "SELECT {MEETING_COLUMNS} FROM meetings WHERE meeting_id = $1"
            ))
            .bind(meeting_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| RegistryError::NotFound(meeting_id.to_string()))?;

            map_meeting_row(&row)
        })
        .await
    }

    async fn active_participant_count(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<u32, RegistryError> {
        timed("active_participant_count", async {
            ensure_meeting_exists(&self.pool, meeting_id).await?;

            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM meeting_participants WHERE meeting_id = $1 AND is_active",
            )
            .bind(meeting_id.as_str())
            .fetch_one(&self.pool)
            .await?;

            Ok(u32::try_from(count).unwrap_or(u32::MAX))
        })
        .await
    }

    async fn is_active_participant(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<bool, RegistryError> {
        timed("is_active_participant", async {
            ensure_meeting_exists(&self.pool, meeting_id).await?;

            let active: bool = sqlx::query_scalar(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM meeting_participants
                    WHERE meeting_id = $1 AND identity = $2 AND is_active
                )
                "#,
            )
            .bind(meeting_id.as_str())
            .bind(identity)
            .fetch_one(&self.pool)
            .await?;

            Ok(active)
        })
        .await
    }

    #[instrument(skip_all, name = "meet.registry.record_join", fields(meeting_id = %meeting_id))]
    async fn record_join(
        &self,
        meeting_id: &MeetingId,
        participant: NewParticipant,
    ) -> Result<ParticipantRecord, RegistryError> {
        timed("record_join", async {
            let mut tx = self.begin().await?;
            let meeting = lock_meeting(&mut tx, meeting_id).await?;

            if meeting.status.is_closed() {
                return Err(RegistryError::AlreadyEnded);
            }

            // Joins hold the meeting row lock, so no other join inserts
            // between the capacity count and the insert below
            let refreshed = sqlx::query(&format!(
                r#"
                UPDATE meeting_participants
                SET display_name = $3, email = $4
                WHERE meeting_id = $1 AND identity = $2 AND is_active
                RETURNING {PARTICIPANT_COLUMNS}
                "#
            ))
            .bind(meeting_id.as_str())
            .bind(&participant.identity)
            .bind(&participant.display_name)
            .bind(&participant.email)
            .fetch_optional(&mut *tx)
            .await?;

            let row = match refreshed {
                Some(row) => row,
                None => {
                    let active: i64 = sqlx::query_scalar(
                        "SELECT COUNT(*) FROM meeting_participants WHERE meeting_id = $1 AND is_active",
                    )
                    .bind(meeting_id.as_str())
                    .fetch_one(&mut *tx)
                    .await?;
                    if active >= i64::from(meeting.settings.max_participants) {
                        return Err(RegistryError::Full);
                    }

                    if meeting.status == MeetingStatus::Scheduled {
                        sqlx::query(
                            "UPDATE meetings SET status = 'active', started_at = NOW() WHERE meeting_id = $1",
                        )
                        .bind(meeting_id.as_str())
                        .execute(&mut *tx)
                        .await?;
                    }

                    sqlx::query(&format!(
                        r#"
                        INSERT INTO meeting_participants (
                            meeting_id, identity, display_name, email, role, joined_at, is_active
                        )
                        VALUES ($1, $2, $3, $4, $5, NOW(), TRUE)
                        RETURNING {PARTICIPANT_COLUMNS}
                        "#
                    ))
                    .bind(meeting_id.as_str())
                    .bind(&participant.identity)
                    .bind(&participant.display_name)
                    .bind(&participant.email)
                    .bind(role_for(&meeting, &participant.identity).as_str())
                    .fetch_one(&mut *tx)
                    .await?
                }
            };

            tx.commit().await?;
            map_participant_row(&row)
        })
        .await
    }

    #[instrument(skip_all, name = "meet.registry.record_leave", fields(meeting_id = %meeting_id))]
    async fn record_leave(
        &self,
        meeting_id: &MeetingId,
        identity: &str,
    ) -> Result<(), RegistryError> {
        timed("record_leave", async {
            ensure_meeting_exists(&self.pool, meeting_id).await?;

            sqlx::query(
                r#"
                UPDATE meeting_participants
                SET is_active = FALSE, left_at = NOW()
                WHERE meeting_id = $1 AND identity = $2 AND is_active
                "#,
            )
            .bind(meeting_id.as_str())
            .bind(identity)
            .execute(&self.pool)
            .await?;

            Ok(())
        })
        .await
    }

    #[instrument(skip_all, name = "meet.registry.end_meeting", fields(meeting_id = %meeting_id))]
    async fn end_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError> {
        timed("end_meeting", async {
            let mut tx = self.begin().await?;
            let meeting = lock_meeting(&mut tx, meeting_id).await?;

            ensure_host(&meeting, requester_identity)?;
            match meeting.status {
                MeetingStatus::Ended | MeetingStatus::Cancelled => {
                    return Err(RegistryError::AlreadyEnded)
                }
                MeetingStatus::Scheduled => {
                    return Err(RegistryError::Conflict(
                        "Meeting has not started; cancel it instead".to_string(),
                    ))
                }
                MeetingStatus::Active => {}
            }

            let row = sqlx::query(&format!(
                r#"
                UPDATE meetings SET status = 'ended', ended_at = NOW()
                WHERE meeting_id = $1
                RETURNING {MEETING_COLUMNS}
                "#
            ))
            .bind(meeting_id.as_str())
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                UPDATE meeting_participants
                SET is_active = FALSE, left_at = NOW()
                WHERE meeting_id = $1 AND is_active
                "#,
            )
            .bind(meeting_id.as_str())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            map_meeting_row(&row)
        })
        .await
    }

    #[instrument(skip_all, name = "meet.registry.cancel_meeting", fields(meeting_id = %meeting_id))]
    async fn cancel_meeting(
        &self,
        meeting_id: &MeetingId,
        requester_identity: &str,
    ) -> Result<Meeting, RegistryError> {
        timed("cancel_meeting", async {
            let mut tx = self.begin().await?;
            let meeting = lock_meeting(&mut tx, meeting_id).await?;

            ensure_host(&meeting, requester_identity)?;
            match meeting.status {
                MeetingStatus::Ended | MeetingStatus::Cancelled => {
                    return Err(RegistryError::AlreadyEnded)
                }
                MeetingStatus::Active => {
                    return Err(RegistryError::Conflict(
                        "Meeting is in progress; end it instead".to_string(),
                    ))
                }
                MeetingStatus::Scheduled => {}
            }

            let row = sqlx::query(&format!(
                r#"
                UPDATE meetings SET status = 'cancelled', ended_at = NOW()
                WHERE meeting_id = $1
                RETURNING {MEETING_COLUMNS}
                "#
            ))
            .bind(meeting_id.as_str())
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            map_meeting_row(&row)
        })
        .await
    }

    async fn roster(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<Vec<ParticipantRecord>, RegistryError> {
        timed("roster", async {
            ensure_meeting_exists(&self.pool, meeting_id).await?;

            let rows = sqlx::query(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM meeting_participants \
                 WHERE meeting_id = $1 ORDER BY participant_id"
            ))
            .bind(meeting_id.as_str())
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_participant_row).collect()
        })
        .await
    }

    async fn persist_chat_message(
        &self,
        meeting_id: &MeetingId,
        message: &ChatMessage,
    ) -> Result<(), RegistryError> {
        timed("persist_chat_message", async {
            let result = sqlx::query(
                r#"
                INSERT INTO meeting_chat_messages (
                    message_id, meeting_id, room_id, sender_identity, sender_name,
                    body, kind, sent_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(message.id)
            .bind(meeting_id.as_str())
            .bind(message.room_id.as_str())
            .bind(&message.sender_identity)
            .bind(&message.sender_name)
            .bind(&message.body)
            .bind(message.kind.as_str())
            .bind(message.timestamp)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                    Err(RegistryError::NotFound(meeting_id.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_chat_history(
        &self,
        meeting_id: &MeetingId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RegistryError> {
        timed("get_chat_history", async {
            ensure_meeting_exists(&self.pool, meeting_id).await?;

            let rows = sqlx::query(
                r#"
                SELECT message_id, room_id, sender_identity, sender_name, body, kind, sent_at
                FROM meeting_chat_messages
                WHERE meeting_id = $1
                ORDER BY seq DESC
                LIMIT $2
                "#,
            )
            .bind(meeting_id.as_str())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

            rows.iter().map(map_chat_row).collect()
        })
        .await
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
