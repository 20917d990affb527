use axum::{
    debug_handler,
    extract::{Path, State},
    Json,
};
use sqlx::SqlitePool;

use crate::{AppResult, AppState};

use super::messages::{self, ChatMessage};

#[debug_handler(state = AppState)]
pub(crate) async fn participant_messages(
    State(db_pool): State<SqlitePool>,
    Path(participant_id): Path<String>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(messages::for_participant(&db_pool, &participant_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn all_messages(State(db_pool): State<SqlitePool>) -> AppResult<Json<Vec<ChatMessage>>> {
    Ok(Json(messages::all(&db_pool).await?))
}
