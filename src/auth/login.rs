use axum::{debug_handler, extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{users, AppError, AppResult, AppState};

use super::{bearer, Keys, TokenKind};

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid username or password".to_owned())
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    State(keys): State<Keys>,
    Json(LoginRequest { username, password }): Json<LoginRequest>,
) -> AppResult<Json<TokenPair>> {
    users::validate_username(&username)?;
    users::validate_password(&password)?;

    let Some(user) = users::find_by_username(&db_pool, &username).await? else {
        tracing::info!(%username, "login for unknown user");
        return Err(invalid_credentials());
    };
    if !user.is_active || !user.verify_password(&password)? {
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(invalid_credentials());
    }

    tracing::info!(user_id = %user.id, "logged in");
    Ok(Json(TokenPair {
        access_token: keys.issue(&user.id, TokenKind::Access)?,
        refresh_token: keys.issue(&user.id, TokenKind::Refresh)?,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn refresh(State(keys): State<Keys>, headers: HeaderMap) -> AppResult<Json<AccessToken>> {
    let claims = keys.verify(bearer(&headers)?, TokenKind::Refresh)?;
    Ok(Json(AccessToken {
        access_token: keys.issue(&claims.sub, TokenKind::Access)?,
    }))
}
