//! Backup file import/export
//!
//! Two JSON backup formats: v1 is a bare array of cookie records, v2 is
//! an object carrying cookies plus per-origin web storage (version 3 is
//! accepted as an alias of 2 by the import path). Version detection is
//! by the `version` field, or by the payload being a bare array. A file
//! matching no known shape is a terminal malformed-input error with no
//! partial import, the one error class that is always user-visible.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::model::{CacheSnapshot, CookieRecord, DatabaseSnapshot, OriginSnapshot};
use crate::repo::{BlobStore, CategoryUpdate, RepoError, SnapshotStore};

/// Version written by export.
pub const CURRENT_VERSION: u32 = 2;

/// Error type for backup operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup file is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("backup file matches no known format")]
    UnrecognizedFormat,

    #[error("unsupported backup version {0}")]
    UnsupportedVersion(u64),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One origin's web storage categories as stored in a v2 backup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebStorageEntry {
    #[serde(rename = "localStorage", skip_serializing_if = "Option::is_none")]
    pub local_storage: Option<HashMap<String, String>>,
    #[serde(rename = "indexedDB", skip_serializing_if = "Option::is_none")]
    pub indexed_db: Option<Vec<DatabaseSnapshot>>,
    #[serde(rename = "cacheStorage", skip_serializing_if = "Option::is_none")]
    pub cache_storage: Option<Vec<CacheSnapshot>>,
}

impl From<OriginSnapshot> for WebStorageEntry {
    fn from(snapshot: OriginSnapshot) -> Self {
        Self {
            local_storage: snapshot.local_storage,
            indexed_db: snapshot.databases,
            cache_storage: snapshot.caches,
        }
    }
}

/// A v2 backup document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupV2 {
    pub version: u32,
    pub timestamp: DateTime<Utc>,
    pub cookies: Vec<CookieRecord>,
    #[serde(rename = "webStorage", default)]
    pub web_storage: HashMap<String, WebStorageEntry>,
}

/// A parsed backup of either format.
#[derive(Debug, Clone)]
pub enum BackupDocument {
    /// Legacy cookies-only format.
    V1 { cookies: Vec<CookieRecord> },
    V2(BackupV2),
}

impl BackupDocument {
    pub fn cookies(&self) -> &[CookieRecord] {
        match self {
            BackupDocument::V1 { cookies } => cookies,
            BackupDocument::V2(doc) => &doc.cookies,
        }
    }
}

/// Parse a backup file, detecting its version.
pub fn parse(json: &str) -> Result<BackupDocument, BackupError> {
    let value: Value = serde_json::from_str(json).map_err(|err| {
        error!(error = %err, "backup import failed: invalid JSON");
        err
    })?;

    // A bare array is the v1 cookies-only format.
    if value.is_array() {
        let cookies: Vec<CookieRecord> = serde_json::from_value(value).map_err(|err| {
            error!(error = %err, "backup import failed: malformed v1 cookie list");
            BackupError::UnrecognizedFormat
        })?;
        return Ok(BackupDocument::V1 { cookies });
    }

    match value.get("version").and_then(Value::as_u64) {
        // v3 is an alias of v2 for forward compatibility.
        Some(2) | Some(3) => {
            let mut doc: BackupV2 = serde_json::from_value(value).map_err(|err| {
                error!(error = %err, "backup import failed: malformed v2 document");
                BackupError::UnrecognizedFormat
            })?;
            doc.version = CURRENT_VERSION;
            Ok(BackupDocument::V2(doc))
        }
        Some(other) => {
            error!(version = other, "backup import failed: unsupported version");
            Err(BackupError::UnsupportedVersion(other))
        }
        None => {
            error!("backup import failed: no version field and not a cookie array");
            Err(BackupError::UnrecognizedFormat)
        }
    }
}

/// Merge a backup's web storage into the repository. Returns the number
/// of origins merged; v1 backups carry none.
pub fn import_web_storage<B: BlobStore>(
    document: &BackupDocument,
    store: &SnapshotStore<B>,
) -> Result<usize, BackupError> {
    let BackupDocument::V2(doc) = document else {
        return Ok(0);
    };

    let mut merged = 0;
    for (origin, entry) in &doc.web_storage {
        store.merge_write(
            origin,
            CategoryUpdate {
                local_storage: entry.local_storage.clone(),
                databases: entry.indexed_db.clone(),
                caches: entry.cache_storage.clone(),
            },
        )?;
        merged += 1;
    }
    Ok(merged)
}

/// Build a v2 export document from cookies and the stored snapshots.
pub fn export(
    cookies: Vec<CookieRecord>,
    snapshots: HashMap<String, OriginSnapshot>,
) -> BackupV2 {
    BackupV2 {
        version: CURRENT_VERSION,
        timestamp: Utc::now(),
        cookies,
        web_storage: snapshots
            .into_iter()
            .map(|(origin, snapshot)| (origin, WebStorageEntry::from(snapshot)))
            .collect(),
    }
}

impl BackupV2 {
    pub fn to_json_pretty(&self) -> Result<String, BackupError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Parameters for re-setting one cookie through the browser cookies API.
#[derive(Debug, Clone, PartialEq)]
pub struct CookieSetParams {
    pub url: String,
    pub name: String,
    pub value: String,
    /// Absent for host-only cookies; setting a domain would widen them.
    pub domain: Option<String>,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<String>,
    /// Absent for session cookies.
    pub expiration_date: Option<f64>,
    pub store_id: Option<String>,
}

/// Translate a captured cookie into set-parameters, applying the
/// host-only and session attribute rules.
pub fn cookie_set_params(record: &CookieRecord) -> CookieSetParams {
    let host = record.domain.trim_start_matches('.');
    let scheme = if record.secure { "https" } else { "http" };
    CookieSetParams {
        url: format!("{scheme}://{host}{}", record.path),
        name: record.name.clone(),
        value: record.value.clone(),
        domain: (!record.host_only).then(|| record.domain.clone()),
        path: record.path.clone(),
        secure: record.secure,
        http_only: record.http_only,
        same_site: record.same_site.clone(),
        expiration_date: (!record.session).then_some(record.expiration_date).flatten(),
        store_id: record.store_id.clone(),
    }
}
