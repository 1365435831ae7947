//! User pages and the operations that require a valid session binding.

use crate::error::{CoreError, CoreResult};
use crate::profiles::ProfileStore;
use hb_identity_core::{IdentityError, IdentityIndex, UserRecord};
use hb_identity_session::SessionBinding;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub alias: String,
    pub profiles: Vec<String>,
}

/// Outcome of an alias change request.
#[derive(Debug, Clone)]
pub struct AliasChange {
    pub user: UserRecord,
    /// False when the alias was unavailable and the record is unchanged.
    pub applied: bool,
}

pub struct AccountService {
    index: Arc<IdentityIndex>,
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<dyn SessionBinding>,
}

impl AccountService {
    pub fn new(
        index: Arc<IdentityIndex>,
        profiles: Arc<dyn ProfileStore>,
        sessions: Arc<dyn SessionBinding>,
    ) -> Self {
        Self {
            index,
            profiles,
            sessions,
        }
    }

    async fn user_by_alias(&self, alias: &str) -> CoreResult<UserRecord> {
        self.index
            .find_by_alias(alias)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("user {}", alias)))
    }

    async fn require_valid(&self, session: Option<&str>, user: &UserRecord) -> CoreResult<()> {
        match session {
            Some(token) if self.sessions.is_valid(token, user).await => Ok(()),
            _ => Err(CoreError::Unauthorized),
        }
    }

    pub async fn user_page(&self, alias: &str) -> CoreResult<UserPage> {
        let user = self.user_by_alias(alias).await?;
        let profiles = self.profiles.list_profiles(user.internal_id).await?;
        Ok(UserPage {
            alias: user.alias,
            profiles,
        })
    }

    pub async fn profile_page(&self, alias: &str, name: &str) -> CoreResult<serde_json::Value> {
        let user = self.user_by_alias(alias).await?;
        self.profiles.load_profile(user.internal_id, name).await
    }

    pub async fn create_profile(
        &self,
        session: Option<&str>,
        alias: &str,
        name: &str,
    ) -> CoreResult<serde_json::Value> {
        let user = self.user_by_alias(alias).await?;
        self.require_valid(session, &user).await?;
        self.profiles.create_profile(user.internal_id, name).await
    }

    pub async fn update_profile(
        &self,
        session: Option<&str>,
        alias: &str,
        name: &str,
        document: serde_json::Value,
    ) -> CoreResult<()> {
        let user = self.user_by_alias(alias).await?;
        self.require_valid(session, &user).await?;
        self.profiles
            .update_profile(user.internal_id, name, document)
            .await
    }

    /// Renames the session's user. An unavailable alias leaves the record
    /// unchanged and reports `applied == false`.
    pub async fn rename_alias(
        &self,
        session: Option<&str>,
        requested_alias: &str,
    ) -> CoreResult<AliasChange> {
        let token = session.ok_or(CoreError::Unauthorized)?;
        let identity = self
            .sessions
            .identity(token)
            .await
            .ok_or(CoreError::Unauthorized)?;
        self.require_valid(session, &identity.user).await?;

        let user = self
            .index
            .rename_alias(identity.user.internal_id, requested_alias)
            .await
            .map_err(|e| match e {
                IdentityError::NotFound(id) => CoreError::NotFound(format!("user {}", id)),
                other => other.into(),
            })?;

        self.sessions.rebind(token, &user).await;

        Ok(AliasChange {
            applied: user.alias == requested_alias,
            user,
        })
    }
}
