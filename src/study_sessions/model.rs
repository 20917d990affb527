use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{db, AppError, AppResult};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StudySession {
    pub id: String,
    pub user_id: String,
    pub session_name: String,
    pub session_description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    pub participants: String,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl StudySession {
    fn validate(&self) -> AppResult<()> {
        db::require("session_name", &self.session_name)?;
        db::max_len("session_name", &self.session_name, 100)?;
        db::require("session_description", &self.session_description)?;
        if self.end_time < self.start_time {
            return Err(AppError::Validation("end_time must not be before start_time".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStudySession {
    pub session_name: String,
    pub session_description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[serde(default)]
    pub participants: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudySessionUpdate {
    pub session_name: Option<String>,
    pub session_description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub participants: Option<String>,
    pub notes: Option<String>,
}

impl StudySessionUpdate {
    fn apply(self, session: &mut StudySession) {
        if let Some(name) = self.session_name {
            session.session_name = name;
        }
        if let Some(description) = self.session_description {
            session.session_description = description;
        }
        if let Some(start_time) = self.start_time {
            session.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            session.end_time = end_time;
        }
        if let Some(participants) = self.participants {
            session.participants = participants;
        }
        if let Some(notes) = self.notes {
            session.notes = Some(notes).filter(|n| !n.is_empty());
        }
        session.updated_at = db::now();
    }
}

pub(crate) async fn insert(db_pool: &SqlitePool, user_id: &str, new: NewStudySession) -> AppResult<StudySession> {
    let now = db::now();
    let session = StudySession {
        id: db::new_id(),
        user_id: user_id.to_owned(),
        session_name: new.session_name,
        session_description: new.session_description,
        start_time: new.start_time,
        end_time: new.end_time,
        participants: new.participants,
        notes: new.notes,
        created_at: now,
        updated_at: now,
    };
    session.validate()?;

    sqlx::query(
        "INSERT INTO study_sessions (id,user_id,session_name,session_description,start_time,end_time,participants,notes,created_at,updated_at) \
         VALUES (?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.session_name)
    .bind(&session.session_description)
    .bind(session.start_time)
    .bind(session.end_time)
    .bind(&session.participants)
    .bind(&session.notes)
    .bind(session.created_at)
    .bind(session.updated_at)
    .execute(db_pool)
    .await?;

    Ok(session)
}

pub(crate) async fn list_for(db_pool: &SqlitePool, user_id: &str) -> AppResult<Vec<StudySession>> {
    Ok(sqlx::query_as("SELECT * FROM study_sessions WHERE user_id=? ORDER BY start_time, rowid")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?)
}

pub(crate) async fn find(db_pool: &SqlitePool, user_id: &str, session_id: &str) -> AppResult<StudySession> {
    sqlx::query_as("SELECT * FROM study_sessions WHERE id=? AND user_id=?")
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("study session"))
}

pub(crate) async fn update(
    db_pool: &SqlitePool,
    user_id: &str,
    session_id: &str,
    update: StudySessionUpdate,
) -> AppResult<StudySession> {
    let mut session = find(db_pool, user_id, session_id).await?;
    update.apply(&mut session);
    session.validate()?;

    sqlx::query(
        "UPDATE study_sessions SET session_name=?,session_description=?,start_time=?,end_time=?,participants=?,notes=?,updated_at=? \
         WHERE id=? AND user_id=?",
    )
    .bind(&session.session_name)
    .bind(&session.session_description)
    .bind(session.start_time)
    .bind(session.end_time)
    .bind(&session.participants)
    .bind(&session.notes)
    .bind(session.updated_at)
    .bind(&session.id)
    .bind(&session.user_id)
    .execute(db_pool)
    .await?;

    Ok(session)
}

pub(crate) async fn delete(db_pool: &SqlitePool, user_id: &str, session_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM study_sessions WHERE id=? AND user_id=?")
        .bind(session_id)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("study session"));
    }
    Ok(())
}
