//! Identity provider adapters and the startup registry of configured providers.

use crate::client::{OAuth2Client, PkceChallenge};
use crate::config::{OAuth2Config, OAuth2ProviderConfig, ProviderDescriptor, ProviderKind};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::types::{ExternalCredential, ExternalIdentity};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One configured identity provider.
#[derive(Clone)]
pub struct ProviderAdapter {
    config: OAuth2ProviderConfig,
    client: OAuth2Client,
}

impl ProviderAdapter {
    pub fn new(config: OAuth2ProviderConfig, client: OAuth2Client) -> Self {
        Self { config, client }
    }

    /// Short name, used as the `provider` of user records and in callback routes.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }

    pub fn kind(&self) -> ProviderKind {
        self.config.kind
    }

    pub fn uses_pkce(&self) -> bool {
        self.config.use_pkce
    }

    pub fn authorization_url(
        &self,
        state_token: &str,
        pkce: Option<&PkceChallenge>,
    ) -> OAuth2Result<String> {
        let pkce = pkce.filter(|_| self.config.use_pkce);
        self.client.authorization_url(&self.config, state_token, pkce)
    }

    /// Exchanges an authorization code for a credential, then looks up the
    /// provider-scoped id of the user it belongs to.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> OAuth2Result<ExternalIdentity> {
        let code_verifier = code_verifier.filter(|_| self.config.use_pkce);
        let token = self
            .client
            .exchange_code(&self.config, code, code_verifier)
            .await?;

        let user_info = self
            .client
            .get_user_info(&self.config, &token.access_token)
            .await?;

        let external_id = self.config.kind.extract_subject(&user_info).ok_or_else(|| {
            OAuth2Error::InvalidUserInfoResponse(format!(
                "No {} user id in user info response",
                self.config.kind.tag()
            ))
        })?;

        debug!(
            "Verified identity {} with provider {}",
            external_id, self.config.name
        );

        Ok(ExternalIdentity {
            credential: ExternalCredential::from_token_response(&self.config.name, token),
            external_id,
        })
    }
}

/// Provider adapters discovered at startup. Immutable afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: Vec<Arc<ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: Vec<ProviderAdapter>) -> Self {
        Self {
            adapters: adapters.into_iter().map(Arc::new).collect(),
        }
    }

    /// Loads every descriptor file in `dir`.
    ///
    /// Unreadable descriptors, unknown provider kinds and duplicate short
    /// names are skipped with a warning. A missing directory yields an empty
    /// registry.
    pub async fn load_from_dir(dir: &Path, config: &OAuth2Config) -> OAuth2Result<Self> {
        let client = OAuth2Client::new(config)?;

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No provider descriptor directory at {}", dir.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut adapters: Vec<ProviderAdapter> = Vec::new();
        for path in paths {
            let config = match Self::read_descriptor(&path).await {
                Ok(config) => config,
                Err(e) => {
                    warn!("Skipping provider descriptor {}: {}", path.display(), e);
                    continue;
                }
            };

            if adapters.iter().any(|a| a.name() == config.name) {
                warn!(
                    "Skipping provider descriptor {}: duplicate short name {}",
                    path.display(),
                    config.name
                );
                continue;
            }

            info!(
                "Loaded {} provider {} ({})",
                config.kind.tag(),
                config.name,
                config.display_name
            );
            adapters.push(ProviderAdapter::new(config, client.clone()));
        }

        Ok(Self::new(adapters))
    }

    async fn read_descriptor(path: &Path) -> OAuth2Result<OAuth2ProviderConfig> {
        let bytes = tokio::fs::read(path).await?;
        let descriptor: ProviderDescriptor = serde_json::from_slice(&bytes)?;
        OAuth2ProviderConfig::from_descriptor(descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ProviderAdapter>> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ProviderAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
