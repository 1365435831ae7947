//! OAuth2 client implementation with PKCE support.

use crate::config::{OAuth2Config, OAuth2ProviderConfig};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::TokenResponse;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, thread_rng};
use reqwest::Client;
use reqwest::header::ACCEPT;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

/// PKCE code challenge and verifier
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        Self::from_verifier(Self::generate_code_verifier())
    }

    /// Rebuild the challenge for a verifier kept in pending state
    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = Self::generate_code_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    fn generate_code_verifier() -> String {
        let mut rng = thread_rng();
        let bytes: Vec<u8> = (0..64).map(|_| rng.r#gen::<u8>()).collect();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn generate_code_challenge(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let result = hasher.finalize();
        URL_SAFE_NO_PAD.encode(result)
    }
}

/// HTTP side of the OAuth2 authorization code flow
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(config: &OAuth2Config) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .user_agent(concat!("homeblocks/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http_client })
    }

    /// Build the authorization URL for a provider, carrying `state` as the
    /// round-trip parameter.
    pub fn authorization_url(
        &self,
        provider_config: &OAuth2ProviderConfig,
        state: &str,
        pkce: Option<&PkceChallenge>,
    ) -> OAuth2Result<String> {
        let mut url = Url::parse(&provider_config.authorization_endpoint)?;

        let mut params = url.query_pairs_mut();
        params.append_pair("response_type", "code");
        params.append_pair("client_id", &provider_config.client_id);
        params.append_pair("redirect_uri", &provider_config.redirect_uri);
        params.append_pair("state", state);

        if !provider_config.scopes.is_empty() {
            params.append_pair("scope", &provider_config.scopes.join(" "));
        }

        if let Some(pkce) = pkce {
            params.append_pair("code_challenge", &pkce.code_challenge);
            params.append_pair("code_challenge_method", &pkce.code_challenge_method);
        }

        for (key, value) in &provider_config.auth_params {
            params.append_pair(key, value);
        }

        drop(params);

        debug!(
            "Generated authorization URL for provider {}",
            provider_config.name
        );
        Ok(url.to_string())
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        provider_config: &OAuth2ProviderConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> OAuth2Result<TokenResponse> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", &provider_config.client_id);
        params.insert("client_secret", &provider_config.client_secret);
        params.insert("redirect_uri", &provider_config.redirect_uri);

        if let Some(verifier) = code_verifier {
            params.insert("code_verifier", verifier);
        }

        let response = self
            .http_client
            .post(&provider_config.token_endpoint)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Token exchange failed: {}", error_text);
            return Err(OAuth2Error::TokenExchangeFailed(error_text));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))?;

        // Some providers report exchange errors in a successful response
        if let Some(error) = body.get("error").and_then(|e| e.as_str()) {
            let description = body
                .get("error_description")
                .and_then(|d| d.as_str())
                .unwrap_or("No description");
            error!("Token exchange failed: {}: {}", error, description);
            return Err(OAuth2Error::TokenExchangeFailed(format!(
                "{}: {}",
                error, description
            )));
        }

        let token_response: TokenResponse = serde_json::from_value(body)
            .map_err(|e| OAuth2Error::InvalidTokenResponse(e.to_string()))?;

        info!(
            "Successfully exchanged code for tokens with provider {}",
            provider_config.name
        );
        Ok(token_response)
    }

    /// Get user info using access token
    pub async fn get_user_info(
        &self,
        provider_config: &OAuth2ProviderConfig,
        access_token: &str,
    ) -> OAuth2Result<serde_json::Value> {
        let response = self
            .http_client
            .get(&provider_config.userinfo_endpoint)
            .header(ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("User info request failed: {}", error_text);
            return Err(OAuth2Error::UserInfoFailed(error_text));
        }

        response
            .json()
            .await
            .map_err(|e| OAuth2Error::InvalidUserInfoResponse(e.to_string()))
    }
}
