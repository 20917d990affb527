use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{db, AppResult};

use super::{hash_password, validate_email, validate_password, validate_username, User};

#[derive(Debug, Clone, Deserialize)]
pub struct Signup {
    pub username: String,
    pub firstname: String,
    pub lastname: String,
    #[serde(default)]
    pub middlename: Option<String>,
    pub email: String,
    pub contact: String,
    pub password: String,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool {
    true
}

impl Signup {
    fn validate(&self) -> AppResult<()> {
        validate_username(&self.username)?;
        validate_password(&self.password)?;
        validate_email(&self.email)?;
        for (field, value, max) in [
            ("firstname", &self.firstname, 50),
            ("lastname", &self.lastname, 50),
            ("contact", &self.contact, 20),
        ] {
            db::require(field, value)?;
            db::max_len(field, value, max)?;
        }
        if let Some(middlename) = &self.middlename {
            db::max_len("middlename", middlename, 50)?;
        }
        Ok(())
    }
}

pub(crate) async fn create_user(db_pool: &SqlitePool, signup: Signup) -> AppResult<User> {
    signup.validate()?;

    let now = db::now();
    let user = User {
        id: db::new_id(),
        username: signup.username.trim().to_lowercase(),
        firstname: signup.firstname,
        lastname: signup.lastname,
        middlename: signup.middlename,
        email: signup.email,
        contact: signup.contact,
        password_hash: hash_password(&signup.password)?,
        image: None,
        is_active: signup.is_active,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO users (id,username,firstname,lastname,middlename,email,contact,password_hash,image,is_active,created_at,updated_at) \
         VALUES (?,?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.firstname)
    .bind(&user.lastname)
    .bind(&user.middlename)
    .bind(&user.email)
    .bind(&user.contact)
    .bind(&user.password_hash)
    .bind(&user.image)
    .bind(user.is_active)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(db_pool)
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user signed up");
    Ok(user)
}

#[debug_handler]
pub(crate) async fn signup(
    State(db_pool): State<SqlitePool>,
    Json(signup): Json<Signup>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = create_user(&db_pool, signup).await?;
    Ok((StatusCode::CREATED, Json(user)))
}
