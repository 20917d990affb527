use axum::{
    debug_handler,
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{auth::AuthUser, db, AppError, AppResult, AppState};

use super::{find_by_id, hash_password, validate_email, validate_password, validate_username, User};

/// Profile edit. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub middlename: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

impl UserUpdate {
    fn apply(self, user: &mut User) -> AppResult<()> {
        if let Some(username) = self.username {
            validate_username(&username)?;
            user.username = username.trim().to_lowercase();
        }
        for (field, value, slot, max) in [
            ("firstname", self.firstname, &mut user.firstname, 50),
            ("lastname", self.lastname, &mut user.lastname, 50),
            ("contact", self.contact, &mut user.contact, 20),
        ] {
            if let Some(value) = value {
                db::require(field, &value)?;
                db::max_len(field, &value, max)?;
                *slot = value;
            }
        }
        if let Some(middlename) = self.middlename {
            db::max_len("middlename", &middlename, 50)?;
            user.middlename = Some(middlename).filter(|m| !m.is_empty());
        }
        if let Some(email) = self.email {
            validate_email(&email)?;
            user.email = email;
        }
        if let Some(image) = self.image {
            user.image = Some(image).filter(|i| !i.is_empty());
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(password) = self.password {
            validate_password(&password)?;
            user.password_hash = hash_password(&password)?;
        }
        user.updated_at = db::now();
        Ok(())
    }
}

pub(crate) async fn save(db_pool: &SqlitePool, user: &User) -> AppResult<()> {
    sqlx::query(
        "UPDATE users SET username=?,firstname=?,lastname=?,middlename=?,email=?,contact=?,\
         password_hash=?,image=?,is_active=?,updated_at=? WHERE id=?",
    )
    .bind(&user.username)
    .bind(&user.firstname)
    .bind(&user.lastname)
    .bind(&user.middlename)
    .bind(&user.email)
    .bind(&user.contact)
    .bind(&user.password_hash)
    .bind(&user.image)
    .bind(user.is_active)
    .bind(user.updated_at)
    .bind(&user.id)
    .execute(db_pool)
    .await?;
    Ok(())
}

#[debug_handler]
pub(crate) async fn list_users(State(db_pool): State<SqlitePool>) -> AppResult<Json<Vec<User>>> {
    Ok(Json(
        sqlx::query_as("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&db_pool)
            .await?,
    ))
}

#[debug_handler]
pub(crate) async fn get_user(
    State(db_pool): State<SqlitePool>,
    Path(user_id): Path<String>,
) -> AppResult<Json<User>> {
    let user = find_by_id(&db_pool, &user_id).await?.ok_or(AppError::NotFound("user"))?;
    Ok(Json(user))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_user(
    State(db_pool): State<SqlitePool>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> AppResult<Json<User>> {
    if auth.user_id != user_id {
        return Err(AppError::Forbidden("cannot edit another user's profile".to_owned()));
    }

    let mut user = find_by_id(&db_pool, &user_id).await?.ok_or(AppError::NotFound("user"))?;
    update.apply(&mut user)?;
    save(&db_pool, &user).await?;

    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::signup::{create_user, tests::signup};

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let db_pool = db::memory_pool().await.unwrap();
        let mut user = create_user(&db_pool, signup("ada", "ada@example.com")).await.unwrap();

        UserUpdate {
            contact: Some("555-0199".into()),
            middlename: Some("King".into()),
            ..Default::default()
        }
        .apply(&mut user)
        .unwrap();
        save(&db_pool, &user).await.unwrap();

        let stored = find_by_id(&db_pool, &user.id).await.unwrap().unwrap();
        assert_eq!(stored.contact, "555-0199");
        assert_eq!(stored.middlename.as_deref(), Some("King"));
        assert_eq!(stored.email, "ada@example.com");
        assert!(stored.updated_at >= stored.created_at);
    }

    #[test]
    fn invalid_fields_rejected() {
        let now = db::now();
        let mut user = User {
            id: "u1".into(),
            username: "ada".into(),
            firstname: "Ada".into(),
            lastname: "Lovelace".into(),
            middlename: None,
            email: "ada@example.com".into(),
            contact: "555".into(),
            password_hash: "x".into(),
            image: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let update = UserUpdate { email: Some("not-an-email".into()), ..Default::default() };
        assert!(matches!(update.apply(&mut user), Err(AppError::Validation(_))));

        let update = UserUpdate { firstname: Some(" ".into()), ..Default::default() };
        assert!(matches!(update.apply(&mut user), Err(AppError::Validation(_))));
        assert_eq!(user.firstname, "Ada");
    }

    #[test]
    fn unknown_fields_rejected() {
        let parsed = serde_json::from_value::<UserUpdate>(serde_json::json!({"password_hash": "x"}));
        assert!(parsed.is_err());
    }
}
