use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{db, AppError, AppResult};

use super::events::SendMessage;

/// A persisted chat line. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
}

impl TryFrom<SendMessage> for NewMessage {
    type Error = AppError;

    fn try_from(SendMessage { sender_id, receiver_id, text }: SendMessage) -> AppResult<Self> {
        fn present(field: &str, value: Option<String>) -> AppResult<String> {
            match value {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(AppError::Validation(format!("{field} is required"))),
            }
        }

        Ok(NewMessage {
            sender_id: present("senderId", sender_id)?,
            receiver_id: present("receiverId", receiver_id)?,
            text: present("text", text)?,
        })
    }
}

pub async fn insert(db_pool: &SqlitePool, new: NewMessage) -> AppResult<ChatMessage> {
    let message = ChatMessage {
        id: db::new_id(),
        sender_id: new.sender_id,
        receiver_id: new.receiver_id,
        text: new.text,
        timestamp: db::now(),
    };

    sqlx::query("INSERT INTO chats (id,sender_id,receiver_id,text,timestamp) VALUES (?,?,?,?,?)")
        .bind(&message.id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.text)
        .bind(message.timestamp)
        .execute(db_pool)
        .await?;

    Ok(message)
}

/// Messages where `participant_id` is sender or receiver, in commit order.
pub async fn for_participant(db_pool: &SqlitePool, participant_id: &str) -> AppResult<Vec<ChatMessage>> {
    Ok(
        sqlx::query_as(
            "SELECT id,sender_id,receiver_id,text,timestamp FROM chats \
             WHERE sender_id=? OR receiver_id=? ORDER BY rowid",
        )
        .bind(participant_id)
        .bind(participant_id)
        .fetch_all(db_pool)
        .await?,
    )
}

pub async fn all(db_pool: &SqlitePool) -> AppResult<Vec<ChatMessage>> {
    Ok(
        sqlx::query_as("SELECT id,sender_id,receiver_id,text,timestamp FROM chats ORDER BY rowid")
            .fetch_all(db_pool)
            .await?,
    )
}
