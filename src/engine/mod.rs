//! Storage engine interfaces
//!
//! Trait seams between the codec and the browser-provided storage engines
//! for one origin: the localStorage key/value area, the IndexedDB factory,
//! and Cache API storage. The in-page glue implements these against the
//! real platform APIs; [`memory`] provides in-process implementations used
//! by tests and by the simulation harness.

pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{IndexSnapshot, KeyPath};

/// Error type for storage engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The platform does not expose this capability (e.g. no Cache API,
    /// no database enumeration). Callers skip the category, never fail.
    #[error("capability unavailable: {0}")]
    Unsupported(&'static str),

    /// Named database or object store does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record violated a store constraint (duplicate key, missing
    /// in-line key, unique index collision).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Opaque backend failure for a single operation.
    #[error("{0}")]
    Backend(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A string key/value area with stable native key order (localStorage).
#[async_trait]
pub trait KeyValueArea: Send + Sync {
    /// All keys in the engine's native enumeration order.
    async fn keys(&self) -> EngineResult<Vec<String>>;

    async fn get(&self, key: &str) -> EngineResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> EngineResult<()>;

    async fn clear(&self) -> EngineResult<()>;
}

/// Name and version of an enumerable database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
    pub version: u64,
}

/// Schema of one object store, as declared during a version upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSchema {
    pub name: String,
    pub key_path: Option<KeyPath>,
    pub auto_increment: bool,
    pub indexes: Vec<IndexSnapshot>,
}

/// Per-origin IndexedDB factory.
#[async_trait]
pub trait IndexedDbFactory: Send + Sync {
    /// Enumerate databases visible to the origin. Engines without an
    /// enumeration API return [`EngineError::Unsupported`]; the caller
    /// treats that as "category unavailable", not as a failure.
    async fn databases(&self) -> EngineResult<Vec<DatabaseInfo>>;

    /// Open an existing database at its current version, never triggering
    /// a schema upgrade.
    async fn open(&self, name: &str) -> EngineResult<Box<dyn DatabaseHandle>>;

    /// Open (creating if needed) at exactly `version`, applying `schema`
    /// inside the upgrade phase so every store and index exists before the
    /// handle is returned.
    async fn open_with_schema(
        &self,
        name: &str,
        version: u64,
        schema: &[StoreSchema],
    ) -> EngineResult<Box<dyn DatabaseHandle>>;

    /// Delete a database outright. Deleting a missing database succeeds.
    async fn delete_database(&self, name: &str) -> EngineResult<()>;
}

/// An open database connection.
///
/// Connections must be closed on every exit path once the caller is done,
/// success or failure; an open handle blocks later delete/upgrade calls.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u64;

    /// Object store names in the database's native order.
    async fn store_names(&self) -> EngineResult<Vec<String>>;

    /// Declared schema of one store (key path, auto-increment, indexes).
    async fn store_schema(&self, store: &str) -> EngineResult<StoreSchema>;

    /// All record values in ascending primary-key order.
    async fn get_all_records(&self, store: &str) -> EngineResult<Vec<Value>>;

    /// All primary keys, in the same order `get_all_records` returns
    /// values when no writer touches the store between the two calls.
    async fn get_all_keys(&self, store: &str) -> EngineResult<Vec<Value>>;

    /// Insert or overwrite one record. `key` must be `Some` exactly when
    /// the store uses out-of-line keys.
    async fn put(&self, store: &str, value: &Value, key: Option<&Value>) -> EngineResult<()>;

    /// Release the connection.
    async fn close(&self);
}

/// Per-origin Cache API storage.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// All cache names for the origin.
    async fn cache_names(&self) -> EngineResult<Vec<String>>;

    /// Open (creating if needed) one named cache.
    async fn open(&self, name: &str) -> EngineResult<Box<dyn CacheArea>>;

    /// Delete one named cache. Deleting a missing cache succeeds.
    async fn delete(&self, name: &str) -> EngineResult<()>;
}

/// A single named cache.
#[async_trait]
pub trait CacheArea: Send + Sync {
    /// Request URLs of every stored entry.
    async fn keys(&self) -> EngineResult<Vec<String>>;

    /// Look up the stored response for a URL.
    async fn match_url(&self, url: &str) -> EngineResult<Option<FetchedResponse>>;

    /// Store a response under a URL, replacing any existing entry.
    async fn put(&self, url: &str, response: FetchedResponse) -> EngineResult<()>;
}

/// A raw response as handed over by the cache engine, body unserialized.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    /// Response type ("basic", "cors", "opaque", ...).
    pub kind: String,
}

impl FetchedResponse {
    /// The `content-length` header as a byte count, if present and sane.
    /// Used as a cheap pre-filter before materializing large bodies.
    pub fn content_length_hint(&self) -> Option<u64> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.trim().parse().ok())
    }
}

/// Everything the codec needs to talk to one origin's storage.
///
/// Engines the platform does not provide at all are `None`; the codec
/// skips those categories without error.
#[derive(Clone)]
pub struct OriginContext {
    pub origin: String,
    pub local_storage: Arc<dyn KeyValueArea>,
    pub indexed_db: Option<Arc<dyn IndexedDbFactory>>,
    pub cache_storage: Option<Arc<dyn CacheStorage>>,
}
