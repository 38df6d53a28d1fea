//! Persisted deployment state
//!
//! `.siteflow/state.json` records what was last applied for every resource,
//! keyed by `provider:logical-id`. Each save keeps the previous file as
//! `state.json.backup`; writers hold `.siteflow/lock.json` while applying.

use crate::error::{CloudError, Result};
use crate::provider::ResourceConfig;
use crate::reconcile::{DEPENDS_ON_ATTR, FINGERPRINT_ATTR};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".siteflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// A lock older than this is assumed to belong to a crashed run
const STALE_LOCK_AFTER_MINUTES: i64 = 60;

/// Contents of `state.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    pub version: u32,

    pub updated_at: DateTime<Utc>,

    /// `provider:logical-id` → resource
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(provider: &str, id: &str) -> String {
        format!("{}:{}", provider, id)
    }

    /// The resources of one provider, keyed by logical id
    pub fn provider_state(&self, provider: &str) -> ProviderState {
        let prefix = format!("{}:", provider);
        let resources = self
            .resources
            .iter()
            .filter_map(|(key, resource)| {
                key.strip_prefix(&prefix)
                    .map(|id| (id.to_string(), resource.clone()))
            })
            .collect();
        ProviderState { resources }
    }

    /// Replace everything recorded for `provider` with `state`
    pub fn replace_provider(&mut self, provider: &str, state: &ProviderState) {
        let prefix = format!("{}:", provider);
        self.resources.retain(|key, _| !key.starts_with(&prefix));
        for (id, resource) in state.iter() {
            self.resources
                .insert(Self::key(provider, id), resource.clone());
        }
        self.updated_at = Utc::now();
    }

}

/// One provider's view of the state, keyed by logical id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderState {
    pub resources: BTreeMap<String, ResourceState>,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: String, state: ResourceState) {
        self.resources.insert(id, state);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceState> {
        self.resources.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceState> {
        self.resources.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// What a provider recorded about one applied resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Physical id (bucket name, distribution id, ...)
    pub id: String,

    pub resource_type: String,

    pub status: ResourceStatus,

    /// Provider attributes, plus the applied fingerprint and dependencies
    pub attributes: BTreeMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Unknown,
            attributes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// State recorded after `resource` was applied as `physical_id`
    pub fn applied(physical_id: impl Into<String>, resource: &ResourceConfig) -> Self {
        Self::new(physical_id, resource.resource_type.clone())
            .with_status(ResourceStatus::Applied)
            .with_attribute(FINGERPRINT_ATTR, serde_json::json!(resource.fingerprint()))
            .with_attribute(DEPENDS_ON_ATTR, serde_json::json!(resource.depends_on))
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Last apply succeeded
    Applied,
    /// Recorded without a completed apply
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Applied => write!(f, "applied"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reads and writes `<project_root>/.siteflow/`
pub struct StateManager {
    dir: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(STATE_DIR),
        }
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
            tracing::debug!(dir = %self.dir.display(), "Created state directory");
        }
        Ok(())
    }

    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.dir.join(STATE_FILE);
        if !path.exists() {
            tracing::debug!("No state file yet");
            return Ok(GlobalState::new());
        }

        let state: GlobalState = serde_json::from_str(&fs::read_to_string(&path).await?)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} was written by a newer siteflow (version {}, supported {})",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Load the whole file together with one provider's projection
    pub async fn load_provider(&self, provider: &str) -> Result<(GlobalState, ProviderState)> {
        let global = self.load().await?;
        let current = global.provider_state(provider);
        Ok((global, current))
    }

    /// Write `state`, keeping the previous file as a backup
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.dir.join(STATE_FILE);
        if path.exists() {
            let backup = self.dir.join(STATE_BACKUP);
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }
        fs::write(&path, serde_json::to_string_pretty(state)?).await?;

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Record `current` as the provider's state and write the file
    pub async fn save_provider(
        &self,
        global: &mut GlobalState,
        provider: &str,
        current: &ProviderState,
    ) -> Result<()> {
        global.replace_provider(provider, current);
        self.save(global).await
    }

    /// Take the state lock. A lock older than an hour is treated as stale.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_dir().await?;
        let path = self.dir.join(LOCK_FILE);

        if path.exists() {
            let held: LockInfo = serde_json::from_str(&fs::read_to_string(&path).await?)?;
            if Utc::now() - held.acquired_at < Duration::minutes(STALE_LOCK_AFTER_MINUTES) {
                return Err(CloudError::LockError(format!(
                    "held by {} (pid {}) since {}",
                    held.holder, held.pid, held.acquired_at
                )));
            }
            tracing::warn!(holder = %held.holder, since = %held.acquired_at, "Taking over stale lock");
        }

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_string_pretty(&info)?).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Held state lock; removed on `release` or drop
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
            tracing::debug!("Released state lock");
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        // Early returns and errors skip release()
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_state_round_trips_per_provider() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut local = ProviderState::new();
        local.add(
            "WebsiteBucket".to_string(),
            ResourceState::new("site-websitebucket-1a2b3c4d", "AWS::S3::Bucket")
                .with_status(ResourceStatus::Applied)
                .with_attribute("WebsiteURL", serde_json::json!("http://example")),
        );

        let mut global = GlobalState::new();
        manager
            .save_provider(&mut global, "local", &local)
            .await
            .unwrap();

        let (loaded, current) = manager.load_provider("local").await.unwrap();
        assert!(loaded.resources.contains_key("local:WebsiteBucket"));
        assert_eq!(
            current
                .get("WebsiteBucket")
                .and_then(|r| r.get_attribute::<String>("WebsiteURL")),
            Some("http://example".to_string())
        );
        assert!(loaded.provider_state("aws").is_empty());
    }

    #[test]
    fn test_replace_provider_leaves_other_providers() {
        let mut global = GlobalState::new();
        let mut aws = ProviderState::new();
        aws.add(
            "WebsiteBucket".to_string(),
            ResourceState::new("prod-bucket", "AWS::S3::Bucket"),
        );
        global.replace_provider("aws", &aws);
        let mut stale = ProviderState::new();
        stale.add(
            "Stale".to_string(),
            ResourceState::new("stale", "AWS::S3::Bucket"),
        );
        global.replace_provider("local", &stale);

        let mut local = ProviderState::new();
        local.add(
            "WebsiteBucket".to_string(),
            ResourceState::new("local-bucket", "AWS::S3::Bucket"),
        );
        global.replace_provider("local", &local);

        assert!(global.resources.contains_key("aws:WebsiteBucket"));
        assert!(global.resources.contains_key("local:WebsiteBucket"));
        assert!(!global.resources.contains_key("local:Stale"));
        assert_eq!(global.provider_state("aws").len(), 1);
    }

    #[tokio::test]
    async fn test_save_keeps_backup() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();

        assert!(temp_dir.path().join(".siteflow/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_newer_state_version_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_released() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));

        lock.release().await.unwrap();
        let lock = manager.acquire_lock().await.unwrap();
        drop(lock);
        assert!(!temp_dir.path().join(".siteflow/lock.json").exists());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let stale = LockInfo {
            holder: "crashed-host".to_string(),
            pid: 1,
            acquired_at: Utc::now() - Duration::hours(2),
        };
        std::fs::create_dir_all(temp_dir.path().join(".siteflow")).unwrap();
        std::fs::write(
            temp_dir.path().join(".siteflow/lock.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        assert!(manager.acquire_lock().await.is_ok());
    }

    #[test]
    fn test_applied_state_records_fingerprint() {
        let resource = ResourceConfig::new("T", "A", "local", serde_json::json!({"k": 1}))
            .with_dependency("B");
        let state = ResourceState::applied("phys-a", &resource);

        assert_eq!(state.status, ResourceStatus::Applied);
        assert_eq!(
            state.get_attribute::<String>(FINGERPRINT_ATTR),
            Some(resource.fingerprint())
        );
        assert_eq!(
            state.get_attribute::<Vec<String>>(DEPENDS_ON_ATTR),
            Some(vec!["B".to_string()])
        );
    }
}
