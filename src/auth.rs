use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Actor, UserId};
use crate::state::AppState;

/// Resolves an opaque bearer token to the subject it was issued for.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, AppError>;
}

/// Process-local token table.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: DashMap<String, UserId>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, subject: UserId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), subject);
        token
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }
}

#[async_trait]
impl CredentialVerifier for TokenRegistry {
    async fn verify(&self, token: &str) -> Result<UserId, AppError> {
        self.tokens
            .get(token)
            .map(|entry| *entry.value())
            .ok_or_else(|| AppError::Unauthenticated("invalid token".to_string()))
    }
}

/// Verifies `token` and loads the acting user's role.
pub async fn authenticate(state: &AppState, token: &str) -> Result<Actor, AppError> {
    let subject = state.credentials.verify(token).await?;
    let user = state
        .repo
        .user_by_id(subject)
        .await?
        .ok_or_else(|| AppError::Unauthenticated("unknown subject".to_string()))?;

    Ok(Actor::from(&user))
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthenticated("missing authorization header".to_string()))?;

    header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthenticated("expected a bearer token".to_string()))
}

/// Extractor for handlers that require an authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        authenticate(state, token).await.map(AuthUser)
    }
}
