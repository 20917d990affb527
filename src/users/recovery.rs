use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::{
    auth::{Keys, TokenKind},
    config::Config,
    db, AppError, AppResult, AppState,
};

use super::{find_by_email, hash_password, profile, validate_password};

/// Hands a recovery link to whatever delivers mail.
pub trait RecoveryMailer: Send + Sync {
    fn send_recovery_link(&self, email: &str, link: &str);
}

/// Writes the link to the log instead of sending mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

impl RecoveryMailer for LogMailer {
    fn send_recovery_link(&self, email: &str, link: &str) {
        tracing::info!(email, "password recovery requested");
        tracing::debug!(email, link, "password recovery link");
    }
}

#[derive(Deserialize)]
pub(crate) struct RecoveryRequest {
    email: String,
}

#[derive(Deserialize)]
pub(crate) struct ResetRequest {
    token: String,
    #[serde(rename = "newPassword")]
    new_password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn request_recovery(
    State(db_pool): State<SqlitePool>,
    State(keys): State<Keys>,
    State(config): State<Arc<Config>>,
    State(mailer): State<Arc<dyn RecoveryMailer>>,
    Json(RecoveryRequest { email }): Json<RecoveryRequest>,
) -> AppResult<Json<Value>> {
    let user = find_by_email(&db_pool, &email).await?.ok_or(AppError::NotFound("email"))?;

    let token = keys.issue(&user.email, TokenKind::Recovery)?;
    let link = format!("{}/recover-password/{token}", config.frontend_url.trim_end_matches('/'));
    mailer.send_recovery_link(&user.email, &link);

    Ok(Json(json!({ "message": "Password recovery email sent" })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reset_password(
    State(db_pool): State<SqlitePool>,
    State(keys): State<Keys>,
    Json(ResetRequest { token, new_password }): Json<ResetRequest>,
) -> AppResult<Json<Value>> {
    let claims = keys
        .verify(&token, TokenKind::Recovery)
        .map_err(|_| AppError::Validation("The password recovery link is invalid or has expired".to_owned()))?;
    validate_password(&new_password)?;

    let mut user = find_by_email(&db_pool, &claims.sub).await?.ok_or(AppError::NotFound("user"))?;
    user.password_hash = hash_password(&new_password)?;
    user.updated_at = db::now();
    profile::save(&db_pool, &user).await?;

    tracing::info!(user_id = %user.id, "password reset");
    Ok(Json(json!({ "message": "Password has been reset successfully" })))
}
