//! OAuth2 protocol types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OAuth2 token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// Provider-side session handle kept in the session binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalCredential {
    pub provider: String,
    pub access_token: String,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ExternalCredential {
    /// An `expires_in` too large to represent is treated as no expiry.
    pub fn from_token_response(provider: &str, token: TokenResponse) -> Self {
        let expires_at = token.expires_in.and_then(|secs| {
            i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        });

        Self {
            provider: provider.to_string(),
            access_token: token.access_token,
            token_type: token.token_type,
            scope: token.scope,
            expires_at,
        }
    }

    /// Expiry as reported by the provider. A credential without an expiry
    /// never expires.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

/// Outcome of a successful code exchange.
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub credential: ExternalCredential,
    pub external_id: String,
}
