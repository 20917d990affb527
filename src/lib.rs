pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod files;
pub mod study_sessions;
pub mod tasks;
pub mod users;

use std::sync::Arc;

use axum::{extract::FromRef, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};
pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Arc<chat::ChatHub>,
    pub keys: auth::Keys,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn users::RecoveryMailer>,
    pub login_limiter: Arc<auth::LoginLimiter>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> AppState {
        AppState {
            db_pool,
            hub: Arc::new(chat::ChatHub::new()),
            keys: auth::Keys::new(config.jwt_secret.as_bytes()),
            login_limiter: Arc::new(auth::LoginLimiter::per_minute(config.login_attempts_per_minute)),
            config: Arc::new(config),
            mailer: Arc::new(users::LogMailer),
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn users::RecoveryMailer>) -> AppState {
        self.mailer = mailer;
        self
    }
}

pub fn app(state: AppState) -> Router {
    let upload_dir = state.config.upload_dir.clone();
    let login_limiter = state.login_limiter.clone();

    Router::new()
        .merge(auth::router(login_limiter))
        .merge(chat::router())
        .nest("/users", users::router())
        .nest("/tasks", tasks::router())
        .nest("/study_sessions", study_sessions::router())
        .nest(files::MOUNT, files::router(&upload_dir))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
