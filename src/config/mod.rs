//! Settings blob
//!
//! The extension's key-value settings blob with its documented fields.
//! The codec and governor consume only the per-category toggles and the
//! cache size bound; the remaining fields are stored and round-tripped
//! for the controller. Loading falls back to defaults when the blob is
//! missing or corrupt.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::{CaptureOptions, SizeBudget};
use crate::repo::{BlobStore, RepoError};

/// Well-known key the settings blob is stored under.
pub const SETTINGS_KEY: &str = "privstash.settings";

/// Persisted user settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for the whole extension.
    pub enabled: bool,
    /// Capture automatically on storage mutations, not just on demand.
    pub auto_save: bool,
    /// Reopen saved origins in a private window on browser start.
    pub auto_reopen_private: bool,
    pub save_cookies: bool,
    #[serde(rename = "save_localStorage")]
    pub save_local_storage: bool,
    #[serde(rename = "save_indexedDB")]
    pub save_indexed_db: bool,
    #[serde(rename = "save_cacheAPI")]
    pub save_cache_api: bool,
    /// Run ceiling for cache capture, in MiB.
    pub cache_size_limit_mb: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_save: false,
            auto_reopen_private: false,
            save_cookies: true,
            save_local_storage: true,
            save_indexed_db: true,
            save_cache_api: true,
            cache_size_limit_mb: 50,
        }
    }
}

impl Settings {
    /// Load from the blob store, returning defaults when missing or
    /// corrupt.
    pub fn load(blob: &dyn BlobStore) -> Self {
        match blob.read(SETTINGS_KEY) {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|err| {
                warn!(error = %err, "settings blob corrupt, using defaults");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(err) => {
                warn!(error = %err, "settings read failed, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, blob: &dyn BlobStore) -> Result<(), RepoError> {
        let json = serde_json::to_string(self).map_err(RepoError::Corrupt)?;
        blob.write(SETTINGS_KEY, &json)
    }

    /// Capture options these settings imply.
    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            local_storage: self.save_local_storage,
            indexed_db: self.save_indexed_db,
            cache_api: self.save_cache_api,
            budget: SizeBudget::with_run_ceiling_mib(self.cache_size_limit_mb),
        }
    }
}
