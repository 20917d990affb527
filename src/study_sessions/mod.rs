mod model;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use sqlx::SqlitePool;

use crate::{auth::AuthUser, AppResult, AppState};

pub use model::{NewStudySession, StudySession, StudySessionUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sessions).post(create_session))
        .route(
            "/{session_id}",
            get(get_session).put(update_session).delete(delete_session),
        )
}

#[debug_handler(state = AppState)]
async fn create_session(
    State(db_pool): State<SqlitePool>,
    auth: AuthUser,
    Json(new): Json<NewStudySession>,
) -> AppResult<(StatusCode, Json<StudySession>)> {
    let session = model::insert(&db_pool, &auth.user_id, new).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[debug_handler(state = AppState)]
async fn list_sessions(State(db_pool): State<SqlitePool>, auth: AuthUser) -> AppResult<Json<Vec<StudySession>>> {
    Ok(Json(model::list_for(&db_pool, &auth.user_id).await?))
}

#[debug_handler(state = AppState)]
async fn get_session(
    State(db_pool): State<SqlitePool>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> AppResult<Json<StudySession>> {
    Ok(Json(model::find(&db_pool, &auth.user_id, &session_id).await?))
}

#[debug_handler(state = AppState)]
async fn update_session(
    State(db_pool): State<SqlitePool>,
    auth: AuthUser,
    Path(session_id): Path<String>,
    Json(update): Json<StudySessionUpdate>,
) -> AppResult<Json<StudySession>> {
    Ok(Json(model::update(&db_pool, &auth.user_id, &session_id, update).await?))
}

#[debug_handler(state = AppState)]
async fn delete_session(
    State(db_pool): State<SqlitePool>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> AppResult<StatusCode> {
    model::delete(&db_pool, &auth.user_id, &session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
