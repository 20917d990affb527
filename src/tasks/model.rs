use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{db, files, AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Status {
    Todo,
    #[serde(rename = "in progress")]
    #[sqlx(rename = "in progress")]
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub priority: Priority,
    pub status: Status,
    pub media: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    fn validate(&self) -> AppResult<()> {
        db::require("title", &self.title)?;
        db::max_len("title", &self.title, 100)?;
        db::require("description", &self.description)?;
        if self.end_date < self.start_date {
            return Err(AppError::Validation("end_date must not be before start_date".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub priority: Priority,
    #[serde(default = "todo")]
    pub status: Status,
    #[serde(default)]
    pub media: Option<String>,
}

fn todo() -> Status {
    Status::Todo
}

/// Task edit. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub media: Option<String>,
}

impl TaskUpdate {
    fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(start_date) = self.start_date {
            task.start_date = start_date;
        }
        if let Some(end_date) = self.end_date {
            task.end_date = end_date;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(media) = self.media {
            task.media = Some(media).filter(|m| !m.is_empty());
        }
        task.updated_at = db::now();
    }
}

/// Swaps a `data:` URL in `media` for the reference of the stored file.
/// Returns the new reference so a failed write can clean it up.
async fn store_media(upload_dir: &Path, task: &mut Task) -> AppResult<Option<String>> {
    let Some(media) = task.media.as_deref().filter(|media| files::is_data_url(media)) else {
        return Ok(None);
    };
    let reference = files::store_data_url(upload_dir, &task.user_id, media).await?;
    task.media = Some(reference.clone());
    Ok(Some(reference))
}

async fn discard(upload_dir: &Path, stored: Option<String>) {
    if let Some(reference) = stored {
        files::remove_stored(upload_dir, &reference).await;
    }
}

pub(crate) async fn insert(db_pool: &SqlitePool, upload_dir: &Path, user_id: &str, new: NewTask) -> AppResult<Task> {
    let now = db::now();
    let mut task = Task {
        id: db::new_id(),
        user_id: user_id.to_owned(),
        title: new.title,
        description: new.description,
        start_date: new.start_date,
        end_date: new.end_date,
        priority: new.priority,
        status: new.status,
        media: new.media.filter(|m| !m.is_empty()),
        created_at: now,
        updated_at: now,
    };
    task.validate()?;
    let stored = store_media(upload_dir, &mut task).await?;

    let result = sqlx::query(
        "INSERT INTO tasks (id,user_id,title,description,start_date,end_date,priority,status,media,created_at,updated_at) \
         VALUES (?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&task.id)
    .bind(&task.user_id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.start_date)
    .bind(task.end_date)
    .bind(task.priority)
    .bind(task.status)
    .bind(&task.media)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(db_pool)
    .await;

    if let Err(err) = result {
        discard(upload_dir, stored).await;
        return Err(err.into());
    }
    Ok(task)
}

pub(crate) async fn list_for(db_pool: &SqlitePool, user_id: &str) -> AppResult<Vec<Task>> {
    Ok(sqlx::query_as("SELECT * FROM tasks WHERE user_id=? ORDER BY rowid")
        .bind(user_id)
        .fetch_all(db_pool)
        .await?)
}

/// Another user's task is indistinguishable from a missing one.
pub(crate) async fn find(db_pool: &SqlitePool, user_id: &str, task_id: &str) -> AppResult<Task> {
    sqlx::query_as("SELECT * FROM tasks WHERE id=? AND user_id=?")
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or(AppError::NotFound("task"))
}

pub(crate) async fn update(
    db_pool: &SqlitePool,
    upload_dir: &Path,
    user_id: &str,
    task_id: &str,
    update: TaskUpdate,
) -> AppResult<Task> {
    let mut task = find(db_pool, user_id, task_id).await?;
    let previous_media = task.media.clone();
    update.apply(&mut task);
    task.validate()?;
    let stored = store_media(upload_dir, &mut task).await?;

    let result = sqlx::query(
        "UPDATE tasks SET title=?,description=?,start_date=?,end_date=?,priority=?,status=?,media=?,updated_at=? \
         WHERE id=? AND user_id=?",
    )
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.start_date)
    .bind(task.end_date)
    .bind(task.priority)
    .bind(task.status)
    .bind(&task.media)
    .bind(task.updated_at)
    .bind(&task.id)
    .bind(&task.user_id)
    .execute(db_pool)
    .await;

    if let Err(err) = result {
        discard(upload_dir, stored).await;
        return Err(err.into());
    }
    if previous_media != task.media {
        discard(upload_dir, previous_media).await;
    }
    Ok(task)
}

/// Deletes the task, then any media file stored for it.
pub(crate) async fn delete(db_pool: &SqlitePool, upload_dir: &Path, user_id: &str, task_id: &str) -> AppResult<()> {
    let task = find(db_pool, user_id, task_id).await?;

    sqlx::query("DELETE FROM tasks WHERE id=? AND user_id=?")
        .bind(&task.id)
        .bind(user_id)
        .execute(db_pool)
        .await?;

    discard(upload_dir, task.media).await;
    Ok(())
}
