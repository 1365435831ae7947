//! Session binding of authenticated identities.
//!
//! A browser session is a signed JWT whose `jti` keys a server-side
//! [`SessionIdentity`]. The identity itself never leaves the server.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hb_identity_core::UserRecord;
use hb_identity_oauth2::ExternalCredential;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expiry out of range")]
    ExpiryOutOfRange,
}

/// Identity bound to a browser session after a successful login.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub credential: ExternalCredential,
    pub user: UserRecord,
    /// State token of the login flow that created this session.
    pub state_token: String,
}

/// Operations the rest of the system uses to read and update session bindings.
/// Sessions are addressed by the token handed to the browser.
#[async_trait]
pub trait SessionBinding: Send + Sync {
    /// Creates a session for `identity` and returns its token.
    async fn bind(&self, identity: SessionIdentity) -> Result<String, SessionError>;

    async fn identity(&self, token: &str) -> Option<SessionIdentity>;

    /// Clears the session's identity.
    async fn unbind(&self, token: &str) -> Option<SessionIdentity>;

    /// True only if the session is bound to the same internal id as `user` and
    /// the provider credential has not expired.
    async fn is_valid(&self, token: &str, user: &UserRecord) -> bool {
        match self.identity(token).await {
            Some(identity) => {
                identity.user.internal_id == user.internal_id && !identity.credential.is_expired()
            }
            None => false,
        }
    }

    /// Replaces the cached user record after a rename. No-op when the session
    /// belongs to another user.
    async fn rebind(&self, token: &str, user: &UserRecord);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub algorithm: Algorithm,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            jwt_ttl: Duration::hours(24),
            algorithm: Algorithm::HS256,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    identity: SessionIdentity,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionService {
    config: SessionConfig,
    active_sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionService {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            active_sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let token_data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(self.config.algorithm),
        )?;
        Ok(token_data.claims)
    }

    pub async fn verify_session(&self, token: &str) -> Result<SessionIdentity, SessionError> {
        let claims = self.verify_token(token)?;
        let sessions = self.active_sessions.read().await;
        sessions
            .get(&claims.jti)
            .map(|entry| entry.identity.clone())
            .ok_or(SessionError::SessionNotFound)
    }

    /// Drops server-side records whose token lifetime has passed.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.active_sessions.write().await;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        self.active_sessions.read().await.len()
    }
}

#[async_trait]
impl SessionBinding for SessionService {
    async fn bind(&self, identity: SessionIdentity) -> Result<String, SessionError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.config.jwt_ttl)
            .ok_or(SessionError::ExpiryOutOfRange)?;
        let jti = Uuid::new_v4().to_string();

        let claims = SessionClaims {
            sub: identity.user.internal_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: jti.clone(),
        };

        let token = encode(
            &Header::new(self.config.algorithm),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )?;

        let mut sessions = self.active_sessions.write().await;
        sessions.insert(
            jti,
            SessionEntry {
                identity,
                expires_at: exp,
            },
        );

        Ok(token)
    }

    async fn identity(&self, token: &str) -> Option<SessionIdentity> {
        match self.verify_session(token).await {
            Ok(identity) => Some(identity),
            Err(e) => {
                debug!("Ignoring session token: {}", e);
                None
            }
        }
    }

    async fn unbind(&self, token: &str) -> Option<SessionIdentity> {
        let claims = self.verify_token(token).ok()?;
        let mut sessions = self.active_sessions.write().await;
        sessions.remove(&claims.jti).map(|entry| entry.identity)
    }

    async fn rebind(&self, token: &str, user: &UserRecord) {
        let Ok(claims) = self.verify_token(token) else {
            return;
        };
        let mut sessions = self.active_sessions.write().await;
        if let Some(entry) = sessions.get_mut(&claims.jti) {
            if entry.identity.user.internal_id == user.internal_id {
                entry.identity = SessionIdentity {
                    user: user.clone(),
                    ..entry.identity.clone()
                };
            }
        }
    }
}
