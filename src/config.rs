use std::{num::NonZeroU32, path::PathBuf};

use anyhow::Context;

/// Process configuration, read from the environment (and `.env` if present).
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub frontend_url: String,
    pub upload_dir: PathBuf,
    pub db_max_connections: u32,
    pub login_attempts_per_minute: NonZeroU32,
}

const DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE: NonZeroU32 = match NonZeroU32::new(10) {
    Some(attempts) => attempts,
    None => unreachable!(),
};

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        dotenv::dotenv().ok();

        let db_max_connections = match dotenv::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().context("DB_MAX_CONNECTIONS must be a positive integer")?,
            Err(_) => 16,
        };
        let login_attempts_per_minute = match dotenv::var("LOGIN_ATTEMPTS_PER_MINUTE") {
            Ok(raw) => raw
                .parse()
                .context("LOGIN_ATTEMPTS_PER_MINUTE must be a positive integer")?,
            Err(_) => DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE,
        };

        Ok(Config {
            database_url: var_or("DATABASE_URL", "sqlite://omnitask.db?mode=rwc"),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            jwt_secret: dotenv::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            frontend_url: var_or("FRONTEND_URL", "http://localhost:5173"),
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "uploads")),
            db_max_connections,
            login_attempts_per_minute,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    dotenv::var(key).unwrap_or_else(|_| default.to_owned())
}
