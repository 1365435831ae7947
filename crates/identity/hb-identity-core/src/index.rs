//! In-memory identity index backed by a full-rewrite JSON snapshot.

use crate::{
    IdentityError, IdentityResult, ProviderKey, RESERVED_ALIAS_PREFIX, UserRecord, is_reserved_alias,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The three lookup structures. Secondary maps point at internal ids so a
/// record is stored exactly once.
#[derive(Debug, Default, Clone)]
struct IndexState {
    by_id: HashMap<u64, UserRecord>,
    by_alias: HashMap<String, u64>,
    by_provider: HashMap<ProviderKey, u64>,
    max_id: u64,
}

impl IndexState {
    fn collision(&self, record: &UserRecord) -> Option<&'static str> {
        if record.internal_id == 0 {
            Some("internal id must be positive")
        } else if record.alias.is_empty() {
            Some("alias is empty")
        } else if self.by_id.contains_key(&record.internal_id) {
            Some("internal id already used")
        } else if self.by_alias.contains_key(&record.alias) {
            Some("alias already used")
        } else if self.by_provider.contains_key(&record.provider_key()) {
            Some("provider identity already used")
        } else {
            None
        }
    }

    fn get_by_provider(&self, key: &ProviderKey) -> Option<&UserRecord> {
        self.by_provider.get(key).and_then(|id| self.by_id.get(id))
    }

    /// Installs `record`, dropping the alias and provider bindings of whatever
    /// record previously held its internal id.
    fn put(&mut self, record: UserRecord) {
        if let Some(old) = self.by_id.remove(&record.internal_id) {
            self.by_alias.remove(&old.alias);
            self.by_provider.remove(&old.provider_key());
        }
        self.max_id = self.max_id.max(record.internal_id);
        self.by_alias.insert(record.alias.clone(), record.internal_id);
        self.by_provider
            .insert(record.provider_key(), record.internal_id);
        self.by_id.insert(record.internal_id, record);
    }

    fn is_alias_available(&self, alias: &str) -> bool {
        !alias.is_empty()
            && !is_reserved_alias(alias)
            && !self.by_alias.contains_key(alias)
    }

    /// Default alias for a freshly allocated id. Only a corrupted snapshot can
    /// already hold `@user<id>`; the suffixed fallback never matches the plain
    /// `@user<n>` form handed to later ids.
    fn default_alias(&self, internal_id: u64) -> String {
        let base = format!("{RESERVED_ALIAS_PREFIX}{internal_id}");
        if !self.by_alias.contains_key(&base) {
            return base;
        }
        let mut n = 1u64;
        loop {
            let candidate = format!("{base}-{n}");
            if !self.by_alias.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn snapshot(&self) -> Vec<&UserRecord> {
        let mut records: Vec<&UserRecord> = self.by_id.values().collect();
        records.sort_by_key(|r| r.internal_id);
        records
    }
}

/// Identity index shared by all request handlers.
///
/// Mutations take the write lock for the whole read-modify-persist cycle and
/// apply their changes to a copy of the state, which replaces the live state
/// only after the snapshot is written. Readers never see a half-applied
/// update, and a failed write leaves the index untouched.
pub struct IdentityIndex {
    state: RwLock<IndexState>,
    snapshot_path: Option<PathBuf>,
}

impl IdentityIndex {
    /// Index without a backing file.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            snapshot_path: None,
        }
    }

    /// Opens the snapshot at `path`, creating an empty one if it does not exist.
    ///
    /// Entries that collide with an already loaded entry, or that cannot be
    /// parsed, are skipped with a warning. A snapshot that is not a JSON array
    /// at all is moved aside and the index starts empty.
    pub async fn open(path: impl Into<PathBuf>) -> IdentityResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => Self::load_state(&path, &bytes).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&path, b"[]").await?;
                IndexState::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {} users from {} (next id {})",
            state.by_id.len(),
            path.display(),
            state.max_id + 1
        );

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
        })
    }

    async fn load_state(path: &Path, bytes: &[u8]) -> IdentityResult<IndexState> {
        let entries: Vec<serde_json::Value> = match serde_json::from_slice(bytes) {
            Ok(entries) => entries,
            Err(e) => {
                let aside = path.with_extension("json.corrupt");
                warn!(
                    "Users index {} is unreadable ({}), moving it to {} and starting empty",
                    path.display(),
                    e,
                    aside.display()
                );
                tokio::fs::rename(path, &aside).await?;
                return Ok(IndexState::default());
            }
        };

        let mut state = IndexState::default();
        for entry in entries {
            let record: UserRecord = match serde_json::from_value(entry.clone()) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Users index corrupted, skipping entry {}: {}", entry, e);
                    continue;
                }
            };

            match state.collision(&record) {
                None => state.put(record),
                Some(reason) => warn!(
                    "Cannot load index for user {} ({}): {}",
                    record.internal_id, record.alias, reason
                ),
            }
        }
        Ok(state)
    }

    pub async fn find_by_internal_id(&self, internal_id: u64) -> Option<UserRecord> {
        self.state.read().await.by_id.get(&internal_id).cloned()
    }

    pub async fn find_by_alias(&self, alias: &str) -> Option<UserRecord> {
        let state = self.state.read().await;
        state
            .by_alias
            .get(alias)
            .and_then(|id| state.by_id.get(id))
            .cloned()
    }

    pub async fn find_by_provider(&self, provider: &str, external_id: &str) -> Option<UserRecord> {
        let state = self.state.read().await;
        state
            .get_by_provider(&ProviderKey::new(provider, external_id))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the user bound to `(provider, external_id)`, creating it with the
    /// next internal id and a default alias if it does not exist yet.
    pub async fn find_or_create(
        &self,
        provider: &str,
        external_id: &str,
    ) -> IdentityResult<UserRecord> {
        let mut state = self.state.write().await;

        if let Some(existing) = state.get_by_provider(&ProviderKey::new(provider, external_id)) {
            return Ok(existing.clone());
        }

        let internal_id = state.max_id + 1;
        let record = UserRecord::new(
            provider,
            external_id,
            internal_id,
            state.default_alias(internal_id),
        );

        let mut next = state.clone();
        next.put(record.clone());
        self.persist(&next).await?;
        *state = next;

        info!(
            "Created user {} ({}) for {}",
            record.internal_id,
            record.alias,
            record.provider_key()
        );
        Ok(record)
    }

    /// Changes the alias of `internal_id`.
    ///
    /// An unavailable alias (taken by anyone, empty, or of the reserved form)
    /// is not an error: the unchanged record is returned and callers compare
    /// its alias with the requested one.
    pub async fn rename_alias(
        &self,
        internal_id: u64,
        requested_alias: &str,
    ) -> IdentityResult<UserRecord> {
        let mut state = self.state.write().await;

        let old = state
            .by_id
            .get(&internal_id)
            .cloned()
            .ok_or(IdentityError::NotFound(internal_id))?;

        if !state.is_alias_available(requested_alias) {
            debug!(
                "Alias {} not available for user {}",
                requested_alias, internal_id
            );
            return Ok(old);
        }

        let record = old.with_alias(requested_alias);
        let mut next = state.clone();
        next.put(record.clone());
        self.persist(&next).await?;
        *state = next;

        info!(
            "User {} renamed from {} to {}",
            internal_id, old.alias, record.alias
        );
        Ok(record)
    }

    async fn persist(&self, state: &IndexState) -> IdentityResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(&state.snapshot())?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn snapshot_path(dir: &TempDir) -> PathBuf {
        dir.path().join("users").join("_index.json")
    }

    #[tokio::test]
    async fn test_find_or_create_is_idempotent() {
        let index = IdentityIndex::in_memory();

        let first = index.find_or_create("github", "1001").await.unwrap();
        assert_eq!(first, UserRecord::new("github", "1001", 1, "@user1"));

        let second = index.find_or_create("github", "1001").await.unwrap();
        assert_eq!(second, first);
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_rename_then_lookup() {
        let index = IdentityIndex::in_memory();
        index.find_or_create("github", "1001").await.unwrap();

        let renamed = index.rename_alias(1, "alice").await.unwrap();
        assert_eq!(renamed, UserRecord::new("github", "1001", 1, "alice"));

        assert!(index.find_by_alias("@user1").await.is_none());
        assert_eq!(index.find_by_alias("alice").await, Some(renamed.clone()));
        assert_eq!(index.find_by_internal_id(1).await, Some(renamed.clone()));
        assert_eq!(
            index.find_by_provider("github", "1001").await,
            Some(renamed)
        );
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_rename() {
        let index = IdentityIndex::in_memory();
        index.find_or_create("github", "1001").await.unwrap();
        index.rename_alias(1, "alice").await.unwrap();

        let second = index.find_or_create("github", "2002").await.unwrap();
        assert_eq!(second.internal_id, 2);
        assert_eq!(second.alias, "@user2");
    }

    #[tokio::test]
    async fn test_rename_to_taken_alias_returns_unchanged_record() {
        let index = IdentityIndex::in_memory();
        index.find_or_create("github", "1001").await.unwrap();
        let bob = index.find_or_create("github", "2002").await.unwrap();
        index.rename_alias(1, "alice").await.unwrap();

        let result = index.rename_alias(2, "alice").await.unwrap();
        assert_eq!(result, bob);
        assert_eq!(index.find_by_alias("alice").await.unwrap().internal_id, 1);
        assert_eq!(index.find_by_alias("@user2").await, Some(bob));
    }

    #[tokio::test]
    async fn test_rename_to_reserved_alias_is_rejected() {
        let index = IdentityIndex::in_memory();
        let user = index.find_or_create("github", "1001").await.unwrap();

        let result = index.rename_alias(1, "@user7").await.unwrap();
        assert_eq!(result, user);
        assert!(index.find_by_alias("@user7").await.is_none());

        let result = index.rename_alias(1, "@username").await.unwrap();
        assert_eq!(result, user);

        let result = index.rename_alias(1, "").await.unwrap();
        assert_eq!(result, user);
    }

    #[tokio::test]
    async fn test_rename_unknown_user_fails() {
        let index = IdentityIndex::in_memory();
        let result = index.rename_alias(42, "alice").await;
        assert!(matches!(result, Err(IdentityError::NotFound(42))));
    }

    #[tokio::test]
    async fn test_same_external_id_on_different_providers() {
        let index = IdentityIndex::in_memory();
        let github = index.find_or_create("github", "1001").await.unwrap();
        let google = index.find_or_create("google", "1001").await.unwrap();

        assert_ne!(github.internal_id, google.internal_id);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);

        {
            let index = IdentityIndex::open(&path).await.unwrap();
            index.find_or_create("github", "1001").await.unwrap();
            index.find_or_create("github", "2002").await.unwrap();
            index.rename_alias(1, "alice").await.unwrap();
        }

        let index = IdentityIndex::open(&path).await.unwrap();
        assert_eq!(index.len().await, 2);
        assert_eq!(index.find_by_alias("alice").await.unwrap().internal_id, 1);

        let third = index.find_or_create("github", "3003").await.unwrap();
        assert_eq!(third.internal_id, 3);
    }

    #[tokio::test]
    async fn test_open_creates_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);

        let index = IdentityIndex::open(&path).await.unwrap();
        assert!(index.is_empty().await);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_next_id_derives_from_max_not_count() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!([
                {"provider": "github", "externalId": "1", "internalId": 3, "alias": "carol"},
                {"provider": "github", "externalId": "2", "internalId": 10, "alias": "dave"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let index = IdentityIndex::open(&path).await.unwrap();
        let user = index.find_or_create("github", "3").await.unwrap();
        assert_eq!(user.internal_id, 11);
        assert_eq!(user.alias, "@user11");
    }

    #[tokio::test]
    async fn test_duplicate_alias_in_snapshot_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!([
                {"provider": "github", "externalId": "1", "internalId": 1, "alias": "alice"},
                {"provider": "github", "externalId": "2", "internalId": 2, "alias": "alice"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let index = IdentityIndex::open(&path).await.unwrap();
        assert_eq!(index.len().await, 1);
        assert_eq!(index.find_by_alias("alice").await.unwrap().internal_id, 1);
        assert!(index.find_by_internal_id(2).await.is_none());
    }

    #[tokio::test]
    async fn test_colliding_and_malformed_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!([
                {"provider": "github", "externalId": "1", "internalId": 1, "alias": "alice"},
                {"provider": "github", "externalId": "1", "internalId": 2, "alias": "bob"},
                {"provider": "github", "externalId": "3", "internalId": 1, "alias": "carol"},
                {"provider": "github", "externalId": "4", "internalId": 0, "alias": "zero"},
                {"provider": "github", "externalId": "5", "internalId": 5, "alias": ""},
                "not an object",
                {"provider": "github", "externalId": "6", "internalId": 6, "alias": "frank"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let index = IdentityIndex::open(&path).await.unwrap();
        assert_eq!(index.len().await, 2);
        assert!(index.find_by_alias("bob").await.is_none());
        assert!(index.find_by_alias("carol").await.is_none());
        assert!(index.find_by_alias("frank").await.is_some());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        let index = IdentityIndex::open(&path).await.unwrap();
        assert!(index.is_empty().await);
        assert!(path.with_extension("json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_default_alias_avoids_corrupted_collision() {
        let dir = TempDir::new().unwrap();
        let path = snapshot_path(&dir);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!([
                {"provider": "github", "externalId": "1", "internalId": 1, "alias": "@user2"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let index = IdentityIndex::open(&path).await.unwrap();
        let user = index.find_or_create("github", "2").await.unwrap();
        assert_eq!(user.internal_id, 2);
        assert_eq!(user.alias, "@user2-1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_keep_uniqueness() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(IdentityIndex::open(snapshot_path(&dir)).await.unwrap());

        let mut handles = vec![];
        for i in 0..20 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                let user = index
                    .find_or_create("github", &(i % 10).to_string())
                    .await
                    .unwrap();
                index.rename_alias(user.internal_id, "contested").await.unwrap()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().internal_id);
        }
        assert_eq!(ids.len(), 10);
        assert_eq!(index.len().await, 10);

        let mut aliases = HashSet::new();
        for id in ids {
            let user = index.find_by_internal_id(id).await.unwrap();
            assert!(aliases.insert(user.alias.clone()));
        }
        assert!(aliases.contains("contested"));

        let reloaded = IdentityIndex::open(snapshot_path(&dir)).await.unwrap();
        assert_eq!(reloaded.len().await, 10);
    }
}
