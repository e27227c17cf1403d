//! Authentication collaborators: bearer token lookup and token issue for the login route.

use crate::action::Hook;
use crate::context::{Context, Identity};
use crate::error::AppError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolves a bearer token to the identity it was issued for.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Identity, AppError>;
}

/// Hands out a token for an identity that just proved its credentials.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, identity: Identity) -> Result<String, AppError>;
}

/// Opaque random tokens kept in process memory. Tokens do not survive a restart.
#[derive(Default)]
pub struct SessionTokens {
    sessions: RwLock<HashMap<String, Identity>>,
}

impl SessionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| AppError::Internal("session lock".into()))?;
        Ok(sessions.remove(token).is_some())
    }
}

#[async_trait]
impl Authenticator for SessionTokens {
    async fn authenticate(&self, token: &str) -> Result<Identity, AppError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| AppError::Internal("session lock".into()))?;
        sessions
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("invalid token".into()))
    }
}

#[async_trait]
impl TokenIssuer for SessionTokens {
    async fn issue(&self, identity: Identity) -> Result<String, AppError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions
            .write()
            .map_err(|_| AppError::Internal("session lock".into()))?
            .insert(token.clone(), identity);
        Ok(token)
    }
}

/// Before-query hook: attach the caller's identity or abort with Unauthenticated.
pub struct Authenticate {
    authenticator: Arc<dyn Authenticator>,
}

impl Authenticate {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Authenticate { authenticator }
    }
}

#[async_trait]
impl Hook for Authenticate {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        let token = ctx.request.bearer_token().ok_or_else(|| {
            tracing::debug!("missing or malformed authorization header");
            AppError::Unauthenticated("missing bearer token".into())
        })?;
        let identity = self.authenticator.authenticate(token).await?;
        ctx.identity = Some(identity);
        Ok(())
    }
}
