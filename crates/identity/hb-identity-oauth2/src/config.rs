//! Provider descriptors and the closed set of supported provider kinds.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported identity providers. Adding a provider means adding a variant
/// here together with its endpoints and subject extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Google,
}

impl ProviderKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "github" => Some(Self::Github),
            "google" => Some(Self::Google),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Google => "google",
        }
    }

    pub(crate) fn default_authorization_endpoint(&self) -> &'static str {
        match self {
            Self::Github => "https://github.com/login/oauth/authorize",
            Self::Google => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    pub(crate) fn default_token_endpoint(&self) -> &'static str {
        match self {
            Self::Github => "https://github.com/login/oauth/access_token",
            Self::Google => "https://oauth2.googleapis.com/token",
        }
    }

    pub(crate) fn default_userinfo_endpoint(&self) -> &'static str {
        match self {
            Self::Github => "https://api.github.com/user",
            Self::Google => "https://openidconnect.googleapis.com/v1/userinfo",
        }
    }

    pub(crate) fn default_scopes(&self) -> Vec<String> {
        match self {
            Self::Github => vec!["read:user".to_string()],
            Self::Google => vec!["openid".to_string()],
        }
    }

    /// Pulls the provider-scoped user id out of a userinfo document.
    ///
    /// GitHub reports a numeric `id`; OpenID Connect providers report `sub`.
    pub(crate) fn extract_subject(&self, user_info: &serde_json::Value) -> Option<String> {
        let field = match self {
            Self::Github => "id",
            Self::Google => "sub",
        };
        match user_info.get(field)? {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }
}

/// One provider descriptor file, as stored under the `oauth/` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "shortName")]
    pub short_name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,
    pub config: ProviderCredentials,
}

/// Provider-specific credential block of a descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// Additional parameters to include in the authorization request
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
    #[serde(default)]
    pub use_pkce: bool,
}

/// Fully resolved configuration of one provider.
#[derive(Debug, Clone)]
pub struct OAuth2ProviderConfig {
    pub kind: ProviderKind,
    pub name: String,
    pub display_name: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_params: HashMap<String, String>,
    pub use_pkce: bool,
}

impl OAuth2ProviderConfig {
    /// Resolves a descriptor, filling endpoints the descriptor leaves out with
    /// the defaults of its provider kind.
    pub fn from_descriptor(descriptor: ProviderDescriptor) -> OAuth2Result<Self> {
        let kind = ProviderKind::from_tag(&descriptor.kind).ok_or_else(|| {
            OAuth2Error::ConfigError(format!(
                "Unrecognized OAuth provider type: {}",
                descriptor.kind
            ))
        })?;

        if descriptor.short_name.is_empty() {
            return Err(OAuth2Error::ConfigError(
                "Provider short name must not be empty".to_string(),
            ));
        }

        let creds = descriptor.config;
        Ok(Self {
            kind,
            name: descriptor.short_name,
            display_name: descriptor.display_name,
            client_id: creds.client_id,
            client_secret: creds.client_secret,
            authorization_endpoint: creds
                .authorization_endpoint
                .unwrap_or_else(|| kind.default_authorization_endpoint().to_string()),
            token_endpoint: creds
                .token_endpoint
                .unwrap_or_else(|| kind.default_token_endpoint().to_string()),
            userinfo_endpoint: creds
                .userinfo_endpoint
                .unwrap_or_else(|| kind.default_userinfo_endpoint().to_string()),
            redirect_uri: descriptor.redirect_uri,
            scopes: creds.scopes.unwrap_or_else(|| kind.default_scopes()),
            auth_params: creds.auth_params,
            use_pkce: creds.use_pkce,
        })
    }
}

/// HTTP settings shared by all provider adapters.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub http_timeout_seconds: u64,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 30,
        }
    }
}

impl OAuth2Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }
}
