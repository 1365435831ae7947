//! Server configuration.

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Placeholder signing secret used when none is configured.
pub const DEFAULT_SESSION_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Holds `users/` (identity snapshot and profile pages) and `oauth/`
    /// (provider descriptors).
    pub data_root: PathBuf,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub secure_cookies: bool,
    pub http_timeout_seconds: u64,
    pub post_login_redirect: String,
    /// Age after which abandoned login attempts are dropped. Unset keeps
    /// them for the process lifetime.
    pub pending_state_ttl_seconds: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_root: PathBuf::from("data"),
            session_secret: DEFAULT_SESSION_SECRET.to_string(),
            session_ttl_hours: 24,
            secure_cookies: false,
            http_timeout_seconds: 30,
            post_login_redirect: "/reroute.html".to_string(),
            pending_state_ttl_seconds: None,
        }
    }
}

impl ServerConfig {
    /// Loads the TOML file at `path` (or an optional `homeblocks.toml` in the
    /// working directory), then applies `HOMEBLOCKS_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("homeblocks").required(false),
        };

        Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("HOMEBLOCKS").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn uses_default_secret(&self) -> bool {
        self.session_secret == DEFAULT_SESSION_SECRET
    }

    /// Session lifetime. Must be positive and keep expiry instants representable.
    pub fn session_ttl(&self) -> anyhow::Result<TimeDelta> {
        TimeDelta::try_hours(self.session_ttl_hours)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .filter(|ttl| Utc::now().checked_add_signed(*ttl).is_some())
            .with_context(|| {
                format!("session_ttl_hours {} is out of range", self.session_ttl_hours)
            })
    }

    /// Pending-state lifetime, if configured. Must be positive and keep the
    /// purge cutoff representable.
    pub fn pending_state_ttl(&self) -> anyhow::Result<Option<TimeDelta>> {
        let Some(secs) = self.pending_state_ttl_seconds else {
            return Ok(None);
        };
        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .filter(|ttl| Utc::now().checked_sub_signed(*ttl).is_some())
            .map(Some)
            .with_context(|| format!("pending_state_ttl_seconds {} is out of range", secs))
    }

    pub fn users_dir(&self) -> PathBuf {
        self.data_root.join("users")
    }

    pub fn index_path(&self) -> PathBuf {
        self.users_dir().join("_index.json")
    }

    pub fn providers_dir(&self) -> PathBuf {
        self.data_root.join("oauth")
    }
}
