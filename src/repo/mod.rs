//! Origin snapshot repository
//!
//! The origin → snapshot mapping, persisted as a single JSON blob under a
//! well-known key. All mutation is merge-write: an incoming write overlays
//! only the categories it carries for its origin and leaves everything
//! else untouched. Each merge re-reads fresh state immediately before
//! modifying it, so concurrent merges for different origins do not lose
//! each other's data; concurrent merges to the same origin are
//! last-writer-wins by design.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{CacheSnapshot, DatabaseSnapshot, OriginSnapshot};

/// Well-known key the repository blob is stored under.
pub const REPOSITORY_KEY: &str = "privstash.snapshots";

/// Error type for repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("blob read/write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository blob is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Keyed blob persistence, the shape of extension-local storage.
pub trait BlobStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, RepoError>;
    fn write(&self, key: &str, value: &str) -> Result<(), RepoError>;
    fn remove(&self, key: &str) -> Result<(), RepoError>;
}

/// File-backed blob store: one JSON file per key under a data directory.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default on-disk location (`~/.privstash`).
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".privstash")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, RepoError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), RepoError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RepoError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), RepoError> {
        self.blobs.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RepoError> {
        self.blobs.lock().remove(key);
        Ok(())
    }
}

/// Categories carried by one merge-write. A `None` field means "leave the
/// stored category alone"; `Some` replaces it wholesale for the origin.
#[derive(Debug, Clone, Default)]
pub struct CategoryUpdate {
    pub local_storage: Option<HashMap<String, String>>,
    pub databases: Option<Vec<DatabaseSnapshot>>,
    pub caches: Option<Vec<CacheSnapshot>>,
}

impl From<OriginSnapshot> for CategoryUpdate {
    fn from(snapshot: OriginSnapshot) -> Self {
        Self {
            local_storage: snapshot.local_storage,
            databases: snapshot.databases,
            caches: snapshot.caches,
        }
    }
}

/// Aggregate repository figures, the user-visible signal after a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepoStats {
    pub origins: usize,
    pub items: usize,
    pub encoded_bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Repository {
    #[serde(flatten)]
    origins: HashMap<String, OriginSnapshot>,
}

/// Store for origin snapshots over a [`BlobStore`].
pub struct SnapshotStore<B: BlobStore> {
    blob: B,
}

impl SnapshotStore<FileBlobStore> {
    /// Store over the default on-disk location.
    pub fn open_default() -> Self {
        Self::new(FileBlobStore::new(FileBlobStore::default_dir()))
    }
}

impl<B: BlobStore> SnapshotStore<B> {
    pub fn new(blob: B) -> Self {
        Self { blob }
    }

    /// Merge one origin's categories into the repository.
    ///
    /// Reads fresh state immediately before modifying it. Categories
    /// absent from `update` keep whatever a prior snapshot stored, so
    /// toggling categories off between saves never loses earlier
    /// captures. An origin whose merged snapshot ends up empty is dropped
    /// entirely.
    pub fn merge_write(&self, origin: &str, update: CategoryUpdate) -> Result<(), RepoError> {
        let mut repo = self.load()?;

        let mut snapshot = repo
            .origins
            .remove(origin)
            .unwrap_or_else(|| OriginSnapshot::new(origin));
        snapshot.origin = origin.to_string();

        if let Some(local_storage) = update.local_storage {
            snapshot.local_storage = Some(local_storage);
        }
        if let Some(databases) = update.databases {
            snapshot.databases = Some(databases);
        }
        if let Some(caches) = update.caches {
            snapshot.caches = Some(caches);
        }

        if snapshot.is_empty() {
            debug!(origin, "merged snapshot is empty, dropping origin");
        } else {
            repo.origins.insert(origin.to_string(), snapshot);
        }

        self.persist(&repo)
    }

    /// All stored snapshots, keyed by origin.
    pub fn read_all(&self) -> Result<HashMap<String, OriginSnapshot>, RepoError> {
        Ok(self.load()?.origins)
    }

    /// One origin's stored snapshot, if any.
    pub fn read_origin(&self, origin: &str) -> Result<Option<OriginSnapshot>, RepoError> {
        Ok(self.load()?.origins.remove(origin))
    }

    /// Remove every stored origin.
    pub fn clear(&self) -> Result<(), RepoError> {
        self.blob.remove(REPOSITORY_KEY)
    }

    /// Aggregate figures across the whole repository.
    pub fn stats(&self) -> Result<RepoStats, RepoError> {
        let repo = self.load()?;
        let items = repo.origins.values().map(|s| s.item_count()).sum();
        let encoded_bytes = repo
            .origins
            .values()
            .filter_map(|s| s.caches.as_ref())
            .flatten()
            .map(|c| c.approximate_size_bytes)
            .sum();
        Ok(RepoStats {
            origins: repo.origins.len(),
            items,
            encoded_bytes,
        })
    }

    fn load(&self) -> Result<Repository, RepoError> {
        match self.blob.read(REPOSITORY_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Repository::default()),
        }
    }

    fn persist(&self, repo: &Repository) -> Result<(), RepoError> {
        let json = serde_json::to_string(repo)?;
        self.blob.write(REPOSITORY_KEY, &json)
    }
}
