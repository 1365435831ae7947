//! Profile page storage.

use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Key-value store of profile documents, keyed by (internal id, profile name).
/// Documents are opaque JSON values.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn list_profiles(&self, user_id: u64) -> CoreResult<Vec<String>>;

    async fn load_profile(&self, user_id: u64, name: &str) -> CoreResult<serde_json::Value>;

    /// Creates an empty page. Fails with `AlreadyExists` if the profile exists.
    async fn create_profile(&self, user_id: u64, name: &str) -> CoreResult<serde_json::Value>;

    /// Replaces an existing page. Fails with `NotFound` if it does not exist.
    async fn update_profile(
        &self,
        user_id: u64,
        name: &str,
        document: serde_json::Value,
    ) -> CoreResult<()>;
}

pub fn empty_page() -> serde_json::Value {
    serde_json::json!({ "blocks": [] })
}

/// Stores each profile as `<root>/<user id>/<profile name>.json`.
pub struct FileProfileStore {
    root: PathBuf,
}

impl FileProfileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_dir(&self, user_id: u64) -> PathBuf {
        self.root.join(user_id.to_string())
    }

    fn profile_path(&self, user_id: u64, name: &str) -> CoreResult<PathBuf> {
        if !is_valid_profile_name(name) {
            return Err(CoreError::NotFound(format!("profile {}", name)));
        }
        Ok(self.user_dir(user_id).join(format!("{}.json", name)))
    }

    async fn write_document(path: &Path, document: &serde_json::Value) -> CoreResult<()> {
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(document)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn list_profiles(&self, user_id: u64) -> CoreResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.user_dir(user_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load_profile(&self, user_id: u64, name: &str) -> CoreResult<serde_json::Value> {
        let path = self.profile_path(user_id, name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CoreError::NotFound(format!("profile {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_profile(&self, user_id: u64, name: &str) -> CoreResult<serde_json::Value> {
        let path = self.profile_path(user_id, name)?;
        tokio::fs::create_dir_all(self.user_dir(user_id)).await?;

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CoreError::AlreadyExists(format!("profile {}", name)));
            }
            Err(e) => return Err(e.into()),
        };

        let page = empty_page();
        file.write_all(&serde_json::to_vec(&page)?).await?;
        file.flush().await?;

        debug!("Created profile {} for user {}", name, user_id);
        Ok(page)
    }

    async fn update_profile(
        &self,
        user_id: u64,
        name: &str,
        document: serde_json::Value,
    ) -> CoreResult<()> {
        let path = self.profile_path(user_id, name)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(CoreError::NotFound(format!("profile {}", name)));
        }
        Self::write_document(&path, &document).await?;

        debug!("Updated profile {} for user {}", name, user_id);
        Ok(())
    }
}
