//! Target documents and their watermarks.
//!
//! [`JsonFileStore`] keeps every target in memory and, when opened with a
//! path, rewrites a JSON snapshot after each mutation (temp file + rename).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::model::{Destination, Target, Watermark};

/// Persisted dedup cursor of each target.
#[async_trait::async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Current watermark, `None` when unset. Fails if the target is gone.
    async fn read_watermark(&self, id: &str) -> Result<Option<Watermark>, StoreError>;

    /// Store `watermark` and the poll completion time in one write.
    async fn advance(
        &self,
        id: &str,
        watermark: Option<Watermark>,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Field-level update of a target document. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TargetPatch {
    pub display_name: Option<String>,
    pub destination: Option<Destination>,
    pub locale: Option<String>,
    pub credentials: Option<String>,
    /// Unset the destination. Takes precedence over `destination`.
    pub clear_destination: bool,
    /// Forget the watermark so the next poll reseeds.
    pub reset_watermark: bool,
}

impl TargetPatch {
    fn apply(self, t: &mut Target) {
        if let Some(name) = self.display_name {
            t.display_name = Some(name);
        }
        if self.clear_destination {
            t.destination = None;
        } else if let Some(dest) = self.destination {
            t.destination = Some(dest);
        }
        if let Some(locale) = self.locale {
            t.locale = Some(locale);
        }
        if let Some(creds) = self.credentials {
            t.credentials = Some(creds);
        }
        if self.reset_watermark {
            t.watermark = None;
        }
    }
}

#[async_trait::async_trait]
pub trait TargetStore: WatermarkStore {
    async fn find(&self, id: &str) -> Result<Option<Target>, StoreError>;
    async fn list(&self) -> Result<Vec<Target>, StoreError>;
    async fn insert(&self, target: Target) -> Result<(), StoreError>;
    /// Returns the updated document, or `None` if the id is unknown.
    async fn update(&self, id: &str, patch: TargetPatch) -> Result<Option<Target>, StoreError>;
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_by_destination(&self, destination: Destination) -> Result<usize, StoreError>;
    /// Rebind every target of `from` to `to`, watermarks untouched.
    /// Returns the number of targets moved.
    async fn migrate_destination(
        &self,
        from: Destination,
        to: Destination,
    ) -> Result<usize, StoreError>;
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
    targets: Mutex<BTreeMap<String, Target>>,
}

impl JsonFileStore {
    /// Volatile store, nothing touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            targets: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open (or start) a store backed by `path`. A missing file is an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let targets = match tokio::fs::read_to_string(&path).await {
            Ok(s) if s.trim().is_empty() => BTreeMap::new(),
            Ok(s) => {
                let list: Vec<Target> = serde_json::from_str(&s)?;
                list.into_iter().map(|t| (t.id.clone(), t)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), targets = targets.len(), "target store opened");
        Ok(Self {
            path: Some(path),
            targets: Mutex::new(targets),
        })
    }

    async fn persist(&self, targets: &BTreeMap<String, Target>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let list: Vec<&Target> = targets.values().collect();
        let body = serde_json::to_vec_pretty(&list)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WatermarkStore for JsonFileStore {
    async fn read_watermark(&self, id: &str) -> Result<Option<Watermark>, StoreError> {
        let targets = self.targets.lock().await;
        targets
            .get(id)
            .map(|t| t.watermark.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn advance(
        &self,
        id: &str,
        watermark: Option<Watermark>,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut targets = self.targets.lock().await;
        let t = targets
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if watermark.is_some() {
            t.watermark = watermark;
        }
        t.last_polled_at = Some(polled_at);
        self.persist(&targets).await
    }
}

#[async_trait::async_trait]
impl TargetStore for JsonFileStore {
    async fn find(&self, id: &str) -> Result<Option<Target>, StoreError> {
        Ok(self.targets.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.targets.lock().await.values().cloned().collect())
    }

    async fn insert(&self, target: Target) -> Result<(), StoreError> {
        let mut targets = self.targets.lock().await;
        if targets.contains_key(&target.id) {
            return Err(StoreError::Duplicate(target.id));
        }
        targets.insert(target.id.clone(), target);
        self.persist(&targets).await
    }

    async fn update(&self, id: &str, patch: TargetPatch) -> Result<Option<Target>, StoreError> {
        let mut targets = self.targets.lock().await;
        let Some(t) = targets.get_mut(id) else {
            return Ok(None);
        };
        patch.apply(t);
        let updated = t.clone();
        self.persist(&targets).await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut targets = self.targets.lock().await;
        if targets.remove(id).is_none() {
            return Ok(false);
        }
        self.persist(&targets).await?;
        Ok(true)
    }

    async fn delete_by_destination(&self, destination: Destination) -> Result<usize, StoreError> {
        let mut targets = self.targets.lock().await;
        let before = targets.len();
        targets.retain(|_, t| t.destination != Some(destination));
        let removed = before - targets.len();
        if removed > 0 {
            self.persist(&targets).await?;
        }
        Ok(removed)
    }

    async fn migrate_destination(
        &self,
        from: Destination,
        to: Destination,
    ) -> Result<usize, StoreError> {
        let mut targets = self.targets.lock().await;
        let mut moved = 0;
        for t in targets.values_mut().filter(|t| t.destination == Some(from)) {
            t.destination = Some(to);
            moved += 1;
        }
        if moved > 0 {
            self.persist(&targets).await?;
        }
        Ok(moved)
    }
}
