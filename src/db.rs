use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{config::Config, AppError, AppResult};

pub static MIGRATOR: Migrator = sqlx::migrate!();

pub async fn connect(config: &Config) -> AppResult<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    MIGRATOR.run(&db_pool).await?;
    tracing::info!("database ready");

    Ok(db_pool)
}

/// Single-connection in-memory database with the schema applied.
/// The connection is pinned so the database lives as long as the pool.
pub async fn memory_pool() -> AppResult<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    MIGRATOR.run(&db_pool).await?;

    Ok(db_pool)
}

pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

pub(crate) fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

pub(crate) fn max_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!("{field} must be at most {max} characters")));
    }
    Ok(())
}

/// Inserts a bare user row so chat and task rows have something to reference.
#[cfg(test)]
pub(crate) async fn seed_user(db_pool: &SqlitePool, id: &str, username: &str) {
    sqlx::query(
        "INSERT INTO users (id,username,firstname,lastname,email,contact,password_hash,is_active,created_at,updated_at) \
         VALUES (?,?,'First','Last',?,'555-0100','x',1,?,?)",
    )
    .bind(id)
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind(now())
    .bind(now())
    .execute(db_pool)
    .await
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_pool_has_schema() {
        let db_pool = memory_pool().await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chats")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db_pool = memory_pool().await.unwrap();
        let err = sqlx::query("INSERT INTO chats (id,sender_id,receiver_id,text,timestamp) VALUES (?,?,?,?,?)")
            .bind(new_id())
            .bind("nobody")
            .bind("nobody-else")
            .bind("hi")
            .bind(now())
            .execute(&db_pool)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(_)));
    }

    #[test]
    fn field_checks() {
        assert!(require("title", "  ").is_err());
        assert!(require("title", "x").is_ok());
        assert!(max_len("title", "abcd", 3).is_err());
        assert!(max_len("title", "abc", 3).is_ok());
    }
}
