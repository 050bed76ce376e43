//! Snapshot data model
//!
//! Serializable representations of one origin's client-side storage:
//! localStorage key/value pairs, IndexedDB databases with their schema and
//! records, and Cache API entries. Field names are renamed to match the
//! JSON backup wire format, so these types serialize directly into backup
//! documents and extension messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialized state of a single origin (scheme+host+port).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginSnapshot {
    pub origin: String,
    /// Key/value pairs from localStorage. Absent when the category is
    /// disabled or was not captured; insertion order is not significant.
    #[serde(rename = "localStorage", skip_serializing_if = "Option::is_none")]
    pub local_storage: Option<HashMap<String, String>>,
    #[serde(rename = "indexedDB", skip_serializing_if = "Option::is_none")]
    pub databases: Option<Vec<DatabaseSnapshot>>,
    #[serde(rename = "cacheStorage", skip_serializing_if = "Option::is_none")]
    pub caches: Option<Vec<CacheSnapshot>>,
}

impl OriginSnapshot {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            ..Default::default()
        }
    }

    /// True when every category is absent or empty. Empty snapshots are
    /// never persisted; the store drops them at merge time.
    pub fn is_empty(&self) -> bool {
        self.local_storage.as_ref().is_none_or(|m| m.is_empty())
            && self.databases.as_ref().is_none_or(|d| d.is_empty())
            && self.caches.as_ref().is_none_or(|c| c.is_empty())
    }

    /// Total record/entry count across all categories, for aggregate
    /// reporting.
    pub fn item_count(&self) -> usize {
        let ls = self.local_storage.as_ref().map_or(0, |m| m.len());
        let db = self.databases.as_ref().map_or(0, |dbs| {
            dbs.iter()
                .flat_map(|d| d.object_stores.iter())
                .map(|s| s.records.len())
                .sum()
        });
        let ca = self
            .caches
            .as_ref()
            .map_or(0, |cs| cs.iter().map(|c| c.entries.len()).sum());
        ls + db + ca
    }
}

/// One IndexedDB database: schema plus all records, in capture order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    /// Database name, unique within the origin.
    pub name: String,
    /// Recorded schema version; always positive.
    pub version: u64,
    #[serde(rename = "objectStores")]
    pub object_stores: Vec<ObjectStoreSnapshot>,
}

/// A declared key path: a single property path or a compound sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    Single(String),
    Compound(Vec<String>),
}

/// One object store: configuration, index definitions, and records.
///
/// Record order is the order the source engine returned them (ascending
/// primary key). Restore re-inserts in that order; the destination engine's
/// own key ordering determines final stored order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStoreSnapshot {
    pub name: String,
    /// Declared key path. `None` means the store uses out-of-line keys and
    /// every record carries its key explicitly.
    #[serde(rename = "keyPath", skip_serializing_if = "Option::is_none")]
    pub key_path: Option<KeyPath>,
    #[serde(rename = "autoIncrement")]
    pub auto_increment: bool,
    #[serde(default)]
    pub indexes: Vec<IndexSnapshot>,
    #[serde(default)]
    pub records: Vec<StoreRecord>,
}

impl ObjectStoreSnapshot {
    /// Whether records carry explicit keys (no declared key path).
    pub fn out_of_line_keys(&self) -> bool {
        self.key_path.is_none()
    }
}

/// An index definition on an object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    #[serde(rename = "keyPath")]
    pub key_path: KeyPath,
    pub unique: bool,
    #[serde(rename = "multiEntry")]
    pub multi_entry: bool,
}

/// One stored record. `key` is present only for out-of-line stores;
/// in-line stores embed the key in `value` at the declared key path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<Value>,
    pub value: Value,
}

/// One named cache from the Cache API, with its surviving entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Cache name, unique within the origin.
    pub name: String,
    pub entries: Vec<CacheEntry>,
    #[serde(rename = "approximateSizeBytes")]
    pub approximate_size_bytes: u64,
}

/// One request/response pair from a cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub response: CachedResponse,
}

/// Encoding used for a serialized response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// Body is stored verbatim as UTF-8 text.
    Text,
    /// Body bytes did not decode as UTF-8 and are stored base64-encoded.
    Base64,
}

/// A serialized HTTP response suitable for reconstructing a `Response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub headers: HashMap<String, String>,
    /// Serialized body, or `None` for bodyless responses.
    pub body: Option<String>,
    #[serde(rename = "bodyEncoding")]
    pub body_encoding: BodyEncoding,
    /// Response type ("basic", "cors", "opaque", ...).
    #[serde(rename = "type")]
    pub kind: String,
}

/// A browser cookie as carried by both backup format versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    #[serde(default)]
    pub same_site: Option<String>,
    /// Unix timestamp in seconds; absent for session cookies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,
    /// Host-only cookies must be re-set without a domain attribute.
    #[serde(default)]
    pub host_only: bool,
    /// Session cookies must be re-set without an expiration.
    #[serde(default)]
    pub session: bool,
}
