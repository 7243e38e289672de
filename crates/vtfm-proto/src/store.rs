//! Local key-value persistence for user choices.
//!
//! The store is string-valued.  [`Preferences`] sits on top of it and is the
//! only place where identifiers are converted to and from their stored form;
//! unreadable or unknown values fall back to catalog defaults.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::catalog::{Catalog, QualityId, Selection, StationId};

pub const KEY_CURRENT_QUALITY: &str = "currentQuality";
pub const KEY_CURRENT_STATION: &str = "currentChanel";
pub const KEY_ONBOARDING: &str = "youtubeModal";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable")]
    Unavailable,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ── JSON file store ───────────────────────────────────────────────────────────

/// A flat JSON object on disk, cached in memory.  Every `set` rewrites the file.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`.  A missing file is an empty store; a corrupt
    /// one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load_entries(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_entries(path: &Path) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("store: cannot read {:?}: {}", path, e);
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("store: ignoring corrupt {:?}: {}", path, e);
                BTreeMap::new()
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let json = {
            let mut entries = self.entries.lock().await;
            entries.insert(key.to_string(), value.to_string());
            serde_json::to_string_pretty(&*entries)?
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, json).await?;
        debug!("store: {} = {}", key, value);
        Ok(())
    }
}

// ── in-memory store ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── typed access ──────────────────────────────────────────────────────────────

/// Typed view over the store for the three persisted user choices.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read the persisted selection.  Each field falls back to the catalog
    /// default independently when absent, unparseable, unknown, or unreadable.
    pub async fn restore_selection(&self, catalog: &Catalog) -> Selection {
        let mut selection = catalog.default_selection();

        if let Some(raw) = self.read(KEY_CURRENT_STATION).await {
            match raw.parse::<StationId>() {
                Ok(id) if catalog.station(id).is_some() => selection.station = id,
                _ => warn!("store: ignoring unknown station {:?}", raw),
            }
        }
        if let Some(raw) = self.read(KEY_CURRENT_QUALITY).await {
            match raw.parse::<QualityId>() {
                Ok(id) if catalog.quality(id).is_some() => selection.quality = id,
                _ => warn!("store: ignoring unknown quality {:?}", raw),
            }
        }
        selection
    }

    pub async fn save_station(&self, id: StationId) -> Result<(), StoreError> {
        self.store.set(KEY_CURRENT_STATION, &id.to_string()).await
    }

    pub async fn save_quality(&self, id: QualityId) -> Result<(), StoreError> {
        self.store.set(KEY_CURRENT_QUALITY, &id.to_string()).await
    }

    /// Whether the onboarding prompt should be shown.  On first run the flag
    /// is absent: it is persisted as `true` and the prompt is shown.
    pub async fn onboarding_pending(&self) -> bool {
        match self.read(KEY_ONBOARDING).await {
            Some(raw) => serde_json::from_str::<bool>(&raw).unwrap_or_else(|e| {
                warn!("store: bad onboarding flag {:?}: {}", raw, e);
                true
            }),
            None => {
                if let Err(e) = self.set_onboarding(true).await {
                    warn!("store: failed to persist onboarding flag: {}", e);
                }
                true
            }
        }
    }

    pub async fn set_onboarding(&self, pending: bool) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&pending)?;
        self.store.set(KEY_ONBOARDING, &encoded).await
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(v) => v.filter(|s| !s.is_empty()),
            Err(e) => {
                warn!("store: read {} failed: {}", key, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable)
        }

        async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }
    }

    #[tokio::test]
    async fn test_empty_store_restores_defaults() {
        let prefs = Preferences::new(Arc::new(MemoryStore::new()));
        let sel = prefs.restore_selection(&Catalog::builtin()).await;
        assert_eq!(sel.station, StationId::new(111));
        assert_eq!(sel.quality, QualityId::new(2));
    }

    #[tokio::test]
    async fn test_restores_persisted_selection() {
        let store = MemoryStore::with_entries([
            (KEY_CURRENT_STATION, "444"),
            (KEY_CURRENT_QUALITY, "3"),
        ]);
        let prefs = Preferences::new(Arc::new(store));
        let sel = prefs.restore_selection(&Catalog::builtin()).await;
        assert_eq!(sel.track_key().as_str(), "4443");
    }

    #[tokio::test]
    async fn test_unknown_values_fall_back_per_field() {
        let store = MemoryStore::with_entries([
            (KEY_CURRENT_STATION, "999"),
            (KEY_CURRENT_QUALITY, "1"),
        ]);
        let prefs = Preferences::new(Arc::new(store));
        let sel = prefs.restore_selection(&Catalog::builtin()).await;
        assert_eq!(sel.station, StationId::new(111));
        assert_eq!(sel.quality, QualityId::new(1));
    }

    #[tokio::test]
    async fn test_broken_store_is_not_fatal() {
        let prefs = Preferences::new(Arc::new(BrokenStore));
        let sel = prefs.restore_selection(&Catalog::builtin()).await;
        assert_eq!(sel, Catalog::builtin().default_selection());
        assert!(prefs.onboarding_pending().await);
        assert!(prefs.save_quality(QualityId::new(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_onboarding_first_run_persists_true() {
        let store = Arc::new(MemoryStore::new());
        let prefs = Preferences::new(store.clone());
        assert!(prefs.onboarding_pending().await);
        assert_eq!(store.get(KEY_ONBOARDING).await.unwrap().as_deref(), Some("true"));

        prefs.set_onboarding(false).await.unwrap();
        assert!(!prefs.onboarding_pending().await);
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path);
        store.set(KEY_CURRENT_QUALITY, "3").await.unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.get(KEY_CURRENT_QUALITY).await.unwrap().as_deref(),
            Some("3")
        );
        assert_eq!(reopened.get(KEY_CURRENT_STATION).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_json_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(KEY_CURRENT_STATION).await.unwrap(), None);
        store.set(KEY_CURRENT_STATION, "222").await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"currentChanel\": \"222\""));
    }
}
