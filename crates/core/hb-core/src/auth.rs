//! Login handshake: start, provider callback, and one-time delivery of the
//! continuation payload.

use crate::error::{CoreError, CoreResult};
use hb_identity_core::IdentityIndex;
use hb_identity_oauth2::{
    OAuth2Error, PendingState, PendingStateStore, PkceChallenge, ProviderRegistry,
};
use hb_identity_session::{SessionBinding, SessionIdentity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// One entry of the login page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOption {
    pub label: String,
    pub url: String,
}

/// Result of a completed callback.
#[derive(Debug, Clone)]
pub struct LoginCompletion {
    /// Session token to hand to the browser.
    pub session_token: String,
    pub identity: SessionIdentity,
}

/// Answer to "who am I logged in as".
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedIn {
    pub alias: String,
    /// Continuation payload of the login flow, present on the first query only.
    pub payload: Option<serde_json::Value>,
}

impl LoggedIn {
    /// The payload object with `logged` set to the alias, or just `{"logged": alias}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = match &self.payload {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        body.insert(
            "logged".to_string(),
            serde_json::Value::String(self.alias.clone()),
        );
        serde_json::Value::Object(body)
    }
}

pub struct AuthOrchestrator {
    index: Arc<IdentityIndex>,
    providers: ProviderRegistry,
    pending: Arc<dyn PendingStateStore>,
    sessions: Arc<dyn SessionBinding>,
}

impl AuthOrchestrator {
    pub fn new(
        index: Arc<IdentityIndex>,
        providers: ProviderRegistry,
        pending: Arc<dyn PendingStateStore>,
        sessions: Arc<dyn SessionBinding>,
    ) -> Self {
        Self {
            index,
            providers,
            pending,
            sessions,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Mints a state token bound to `payload` and returns, for every configured
    /// provider, a label and an authorization URL carrying that token.
    pub async fn start_login(&self, payload: serde_json::Value) -> CoreResult<Vec<LoginOption>> {
        let pkce = self
            .providers
            .iter()
            .any(|p| p.uses_pkce())
            .then(PkceChallenge::new);

        let state = PendingState::new(payload, pkce.as_ref().map(|p| p.code_verifier.clone()));

        let options = self
            .providers
            .iter()
            .map(|provider| {
                let url = provider
                    .authorization_url(&state.token, pkce.as_ref())
                    .map_err(|e| CoreError::Configuration(format!("{}: {}", provider.name(), e)))?;
                Ok(LoginOption {
                    label: format!("Login with {}", provider.display_name()),
                    url,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        self.pending.store(state).await;
        Ok(options)
    }

    /// Completes a login on the provider's redirect back.
    ///
    /// The pending state is checked before the provider is contacted and is
    /// not consumed here, so a failed exchange can be retried with the same
    /// state.
    pub async fn handle_callback(
        &self,
        provider_name: &str,
        state: Option<&str>,
        code: Option<&str>,
    ) -> CoreResult<LoginCompletion> {
        let pending = match state {
            Some(token) => self.pending.get(token).await,
            None => None,
        };
        let Some(pending) = pending else {
            warn!(
                "Rejected {} callback with unknown state {:?}",
                provider_name, state
            );
            return Err(CoreError::InvalidState);
        };

        let provider = self
            .providers
            .get(provider_name)
            .ok_or_else(|| CoreError::NotFound(format!("provider {}", provider_name)))?;

        let code = code.ok_or(CoreError::ProviderAuthFailure(
            OAuth2Error::MissingAuthorizationCode,
        ))?;

        let external = provider
            .exchange_code(code, pending.code_verifier.as_deref())
            .await
            .map_err(|e| {
                error!("Authentication with {} failed: {}", provider_name, e);
                CoreError::ProviderAuthFailure(e)
            })?;

        let user = self
            .index
            .find_or_create(provider.name(), &external.external_id)
            .await?;

        let identity = SessionIdentity {
            credential: external.credential,
            user,
            state_token: pending.token,
        };
        let session_token = self.sessions.bind(identity.clone()).await?;

        info!(
            "User {} ({}) logged in with {}",
            identity.user.internal_id, identity.user.alias, provider_name
        );

        Ok(LoginCompletion {
            session_token,
            identity,
        })
    }

    /// Returns the alias the session is logged in as. The first query after a
    /// login also consumes and returns the login's continuation payload.
    pub async fn query_logged_in(&self, session: Option<&str>) -> Option<LoggedIn> {
        let identity = self.sessions.identity(session?).await?;
        let pending = self.pending.take(&identity.state_token).await;

        Some(LoggedIn {
            alias: identity.user.alias,
            payload: pending.map(|p| p.payload),
        })
    }

    /// Alias of the session's user, without touching pending state.
    pub async fn current_alias(&self, session: Option<&str>) -> Option<String> {
        let identity = self.sessions.identity(session?).await?;
        Some(identity.user.alias)
    }

    pub async fn logout(&self, session: Option<&str>) {
        if let Some(token) = session {
            if let Some(identity) = self.sessions.unbind(token).await {
                info!("User {} logged out", identity.user.internal_id);
            }
        }
    }

    /// Drops pending states older than `max_age`.
    pub async fn purge_pending(&self, max_age: chrono::Duration) -> usize {
        self.pending.purge_older_than(max_age).await
    }
}
