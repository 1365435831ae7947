//! Core identity types and the user identity index.
//!
//! A [`UserRecord`] binds one external identity (provider + provider-scoped id)
//! to a durable internal id and a unique alias. The [`IdentityIndex`] keeps the
//! three lookup structures consistent and persists a full snapshot on every
//! mutation.

mod index;

pub use index::IdentityIndex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of the aliases synthesized for new users. Aliases starting with it
/// can never be claimed through a rename.
pub const RESERVED_ALIAS_PREFIX: &str = "@user";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("User not found: {0}")]
    NotFound(u64),

    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// Immutable user record. Alias changes produce a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub provider: String,
    pub external_id: String,
    pub internal_id: u64,
    pub alias: String,
}

impl UserRecord {
    pub fn new(
        provider: impl Into<String>,
        external_id: impl Into<String>,
        internal_id: u64,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            external_id: external_id.into(),
            internal_id,
            alias: alias.into(),
        }
    }

    pub fn provider_key(&self) -> ProviderKey {
        ProviderKey::new(&self.provider, &self.external_id)
    }

    /// Copy of this record carrying a different alias.
    pub fn with_alias(&self, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..self.clone()
        }
    }
}

/// Lookup key for an external identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub provider: String,
    pub external_id: String,
}

impl ProviderKey {
    pub fn new(provider: &str, external_id: &str) -> Self {
        Self {
            provider: provider.to_string(),
            external_id: external_id.to_string(),
        }
    }
}

impl std::fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.provider, self.external_id)
    }
}

/// Whether `alias` is of the auto-generated form.
pub fn is_reserved_alias(alias: &str) -> bool {
    alias.starts_with(RESERVED_ALIAS_PREFIX)
}
