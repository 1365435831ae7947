//! Wiring of the identity stores and services shared by all handlers.

use crate::config::ServerConfig;
use anyhow::Context;
use hb_core::{AccountService, AuthOrchestrator, FileProfileStore};
use hb_identity_core::IdentityIndex;
use hb_identity_oauth2::{InMemoryStateStore, OAuth2Config, ProviderRegistry};
use hb_identity_session::{SessionConfig, SessionService};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AuthOrchestrator>,
    pub accounts: Arc<AccountService>,
    pub sessions: Arc<SessionService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub async fn build(config: &ServerConfig) -> anyhow::Result<Self> {
        let index_path = config.index_path();
        let index = Arc::new(
            IdentityIndex::open(&index_path)
                .await
                .with_context(|| format!("opening identity index {}", index_path.display()))?,
        );
        info!("Loaded {} identities from {}", index.len().await, index_path.display());

        let oauth = OAuth2Config::new().with_http_timeout(config.http_timeout_seconds);
        let providers_dir = config.providers_dir();
        let providers = ProviderRegistry::load_from_dir(&providers_dir, &oauth)
            .await
            .with_context(|| format!("loading providers from {}", providers_dir.display()))?;
        if providers.is_empty() {
            warn!("No identity providers configured in {}", providers_dir.display());
        }

        if config.uses_default_secret() {
            warn!("session_secret is not configured; session tokens are signed with the default secret");
        }
        let sessions = Arc::new(SessionService::new(SessionConfig {
            jwt_secret: config.session_secret.clone(),
            jwt_ttl: config.session_ttl()?,
            ..SessionConfig::default()
        }));
        let pending = Arc::new(InMemoryStateStore::new());
        let profiles = Arc::new(FileProfileStore::new(config.users_dir()));

        let orchestrator = Arc::new(AuthOrchestrator::new(
            index.clone(),
            providers,
            pending,
            sessions.clone(),
        ));
        let accounts = Arc::new(AccountService::new(index, profiles, sessions.clone()));

        Ok(Self {
            orchestrator,
            accounts,
            sessions,
            config: Arc::new(config.clone()),
        })
    }
}
