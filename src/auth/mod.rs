mod limit;
mod login;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware,
    routing::post,
    Router,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult, AppState};

pub use limit::LoginLimiter;

pub fn router(login_limiter: Arc<LoginLimiter>) -> Router<AppState> {
    Router::new()
        .route(
            "/login",
            post(login::login).layer(middleware::from_fn_with_state(login_limiter, limit::limit_login)),
        )
        .route("/login/token/refresh", post(login::refresh))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Recovery,
}

impl TokenKind {
    fn lifetime_secs(self) -> u64 {
        match self {
            TokenKind::Access => 60 * 60,
            TokenKind::Refresh => 30 * 24 * 60 * 60,
            TokenKind::Recovery => 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// user id, or the email address for recovery tokens
    pub sub: String,
    pub kind: TokenKind,
    pub iat: u64,
    pub exp: u64,
}

/// HS256 signing keys derived from the configured secret.
#[derive(Clone)]
pub struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    pub fn new(secret: &[u8]) -> Keys {
        Keys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    pub fn issue(&self, subject: &str, kind: TokenKind) -> AppResult<String> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(anyhow::Error::from)?
            .as_secs();
        let claims = Claims {
            sub: subject.to_owned(),
            kind,
            iat,
            exp: iat + kind.lifetime_secs(),
        };
        Ok(jsonwebtoken::encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> AppResult<Claims> {
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                AppError::Unauthorized("invalid or expired token".to_owned())
            })?
            .claims;

        if claims.kind != kind {
            return Err(AppError::Unauthorized("wrong kind of token".to_owned()));
        }
        Ok(claims)
    }
}

pub(crate) fn bearer(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_owned()))
}

/// The caller, from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    Keys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Keys::from_ref(state);
        let claims = keys.verify(bearer(&parts.headers)?, TokenKind::Access)?;
        Ok(AuthUser { user_id: claims.sub })
    }
}
