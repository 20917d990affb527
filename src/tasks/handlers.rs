use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth::AuthUser, config::Config, AppResult, AppState};

use super::model::{self, NewTask, Status, Task, TaskUpdate};

#[derive(Deserialize)]
pub(crate) struct StatusChange {
    status: Status,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_task(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    auth: AuthUser,
    Json(new): Json<NewTask>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = model::insert(&db_pool, &config.upload_dir, &auth.user_id, new).await?;
    tracing::debug!(task_id = %task.id, user_id = %auth.user_id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_tasks(State(db_pool): State<SqlitePool>, auth: AuthUser) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(model::list_for(&db_pool, &auth.user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn get_task(
    State(db_pool): State<SqlitePool>,
    auth: AuthUser,
    Path(task_id): Path<String>,
) -> AppResult<Json<Task>> {
    Ok(Json(model::find(&db_pool, &auth.user_id, &task_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_task(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    auth: AuthUser,
    Path(task_id): Path<String>,
    Json(update): Json<TaskUpdate>,
) -> AppResult<Json<Task>> {
    Ok(Json(model::update(&db_pool, &config.upload_dir, &auth.user_id, &task_id, update).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_status(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    auth: AuthUser,
    Path(task_id): Path<String>,
    Json(StatusChange { status }): Json<StatusChange>,
) -> AppResult<Json<Task>> {
    let update = TaskUpdate {
        status: Some(status),
        ..Default::default()
    };
    Ok(Json(model::update(&db_pool, &config.upload_dir, &auth.user_id, &task_id, update).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_task(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    auth: AuthUser,
    Path(task_id): Path<String>,
) -> AppResult<StatusCode> {
    model::delete(&db_pool, &config.upload_dir, &auth.user_id, &task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
