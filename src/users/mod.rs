mod profile;
mod recovery;
mod signup;

use std::collections::BTreeMap;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use time::OffsetDateTime;

use crate::{AppError, AppResult, AppState};

pub use profile::UserUpdate;
pub use recovery::{LogMailer, RecoveryMailer};
pub use signup::Signup;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(profile::list_users).post(signup::signup))
        .route("/{user_id}", get(profile::get_user).put(profile::update_user))
        .route("/request-password-recovery", post(recovery::request_recovery))
        .route("/reset-password", post(recovery::reset_password))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    pub middlename: Option<String>,
    pub email: String,
    pub contact: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub image: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn verify_password(&self, password: &str) -> AppResult<bool> {
        Ok(bcrypt::verify(password, &self.password_hash)?)
    }
}

pub(crate) fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

pub(crate) fn validate_username(username: &str) -> AppResult<()> {
    if username.trim().chars().count() < 3 {
        return Err(AppError::Validation("username must be at least 3 characters".to_owned()));
    }
    crate::db::max_len("username", username, 50)
}

pub(crate) fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < 6 {
        return Err(AppError::Validation("password must be at least 6 characters".to_owned()));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            crate::db::max_len("email", email, 100)
        }
        _ => Err(AppError::Validation("email is not valid".to_owned())),
    }
}

pub async fn find_by_id(db_pool: &SqlitePool, user_id: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?)
}

pub async fn find_by_username(db_pool: &SqlitePool, username: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE username=?")
        .bind(username.to_lowercase())
        .fetch_optional(db_pool)
        .await?)
}

pub async fn find_by_email(db_pool: &SqlitePool, email: &str) -> AppResult<Option<User>> {
    Ok(sqlx::query_as("SELECT * FROM users WHERE email=?")
        .bind(email)
        .fetch_optional(db_pool)
        .await?)
}

/// `user id -> username` for the ids the store knows about.
pub async fn display_names(db_pool: &SqlitePool, user_ids: &[String]) -> AppResult<BTreeMap<String, String>> {
    if user_ids.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut query = QueryBuilder::<Sqlite>::new("SELECT id,username FROM users WHERE id IN (");
    let mut ids = query.separated(",");
    for user_id in user_ids {
        ids.push_bind(user_id);
    }
    ids.push_unseparated(")");

    let rows: Vec<(String, String)> = query.build_query_as().fetch_all(db_pool).await?;
    Ok(rows.into_iter().collect())
}
