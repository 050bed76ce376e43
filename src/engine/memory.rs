//! In-memory storage engines
//!
//! In-process implementations of the engine traits, used by the test
//! suites and the simulation harness. They model the platform behavior
//! the codec depends on: stable key enumeration order for the key/value
//! area, ascending primary-key order for `get_all_*`, schema application
//! during versioned opens, and replace-on-put cache semantics.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{
    CacheArea, CacheStorage, DatabaseHandle, DatabaseInfo, EngineError, EngineResult,
    FetchedResponse, IndexedDbFactory, KeyValueArea, OriginContext, StoreSchema,
};
use crate::model::KeyPath;

/// Key/value area preserving insertion order, like localStorage.
#[derive(Debug, Default)]
pub struct MemoryKeyValueArea {
    entries: Mutex<Vec<(String, String)>>,
    /// Keys whose reads fail, for item-level failure tests.
    poison_keys: Mutex<HashSet<String>>,
}

impl MemoryKeyValueArea {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make reads of `key` fail with a backend error.
    pub fn poison_key(&self, key: &str) {
        self.poison_keys.lock().insert(key.to_string());
    }

    /// Snapshot of the current contents, for assertions.
    pub fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueArea for MemoryKeyValueArea {
    async fn keys(&self) -> EngineResult<Vec<String>> {
        Ok(self.entries.lock().iter().map(|(k, _)| k.clone()).collect())
    }

    async fn get(&self, key: &str) -> EngineResult<Option<String>> {
        if self.poison_keys.lock().contains(key) {
            return Err(EngineError::Backend(format!("read failed for {key:?}")));
        }
        Ok(self
            .entries
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> EngineResult<()> {
        let mut entries = self.entries.lock();
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }

    async fn clear(&self) -> EngineResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

/// Ordering of IndexedDB keys: numbers sort before strings, strings
/// before arrays; arrays compare element-wise. Dates and binary keys are
/// not modeled.
pub fn compare_keys(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Array(_) => 2,
            _ => 3,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (ex, ey) in x.iter().zip(y.iter()) {
                let ord = compare_keys(ex, ey);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Resolve a dotted key path against a value.
fn extract_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

/// Resolve a declared key path (single or compound) against a value.
pub fn extract_key(value: &Value, key_path: &KeyPath) -> Option<Value> {
    match key_path {
        KeyPath::Single(path) => extract_path(value, path),
        KeyPath::Compound(paths) => {
            let parts: Option<Vec<Value>> =
                paths.iter().map(|p| extract_path(value, p)).collect();
            parts.map(Value::Array)
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryStore {
    schema: StoreSchema,
    /// Records sorted by primary key under [`compare_keys`].
    records: Vec<(Value, Value)>,
    auto_counter: u64,
}

impl MemoryStore {
    fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            records: Vec::new(),
            auto_counter: 0,
        }
    }

    fn insert(&mut self, key: Value, value: Value) -> EngineResult<()> {
        // Unique index enforcement.
        for index in self.schema.indexes.iter().filter(|i| i.unique) {
            if let Some(idx_key) = extract_key(&value, &index.key_path) {
                let collision = self.records.iter().any(|(k, v)| {
                    compare_keys(k, &key) != Ordering::Equal
                        && extract_key(v, &index.key_path)
                            .is_some_and(|existing| {
                                compare_keys(&existing, &idx_key) == Ordering::Equal
                            })
                });
                if collision {
                    return Err(EngineError::Constraint(format!(
                        "unique index {:?} collision in store {:?}",
                        index.name, self.schema.name
                    )));
                }
            }
        }

        match self
            .records
            .binary_search_by(|(k, _)| compare_keys(k, &key))
        {
            Ok(pos) => self.records[pos].1 = value,
            Err(pos) => self.records.insert(pos, (key, value)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryDatabase {
    version: u64,
    /// Stores in creation order.
    stores: Vec<MemoryStore>,
}

impl MemoryDatabase {
    fn store(&self, name: &str) -> EngineResult<&MemoryStore> {
        self.stores
            .iter()
            .find(|s| s.schema.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("object store {name:?}")))
    }

    fn store_mut(&mut self, name: &str) -> EngineResult<&mut MemoryStore> {
        self.stores
            .iter_mut()
            .find(|s| s.schema.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("object store {name:?}")))
    }
}

/// In-memory IndexedDB factory for one origin.
pub struct MemoryIndexedDb {
    databases: Arc<Mutex<HashMap<String, MemoryDatabase>>>,
    enumeration_supported: bool,
}

impl MemoryIndexedDb {
    pub fn new() -> Self {
        Self {
            databases: Arc::new(Mutex::new(HashMap::new())),
            enumeration_supported: true,
        }
    }

    /// An engine whose `databases()` reports the capability gap, like
    /// platforms without `indexedDB.databases()`.
    pub fn without_enumeration() -> Self {
        Self {
            databases: Arc::new(Mutex::new(HashMap::new())),
            enumeration_supported: false,
        }
    }

    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl IndexedDbFactory for MemoryIndexedDb {
    async fn databases(&self) -> EngineResult<Vec<DatabaseInfo>> {
        if !self.enumeration_supported {
            return Err(EngineError::Unsupported("database enumeration"));
        }
        let mut infos: Vec<DatabaseInfo> = self
            .databases
            .lock()
            .iter()
            .map(|(name, db)| DatabaseInfo {
                name: name.clone(),
                version: db.version,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn open(&self, name: &str) -> EngineResult<Box<dyn DatabaseHandle>> {
        let databases = self.databases.lock();
        let db = databases
            .get(name)
            .ok_or_else(|| EngineError::NotFound(format!("database {name:?}")))?;
        Ok(Box::new(MemoryDbHandle {
            name: name.to_string(),
            version: db.version,
            databases: Arc::clone(&self.databases),
        }))
    }

    async fn open_with_schema(
        &self,
        name: &str,
        version: u64,
        schema: &[StoreSchema],
    ) -> EngineResult<Box<dyn DatabaseHandle>> {
        let mut databases = self.databases.lock();
        let db = databases.entry(name.to_string()).or_default();
        if db.version < version {
            // Upgrade phase: create any store the schema declares that
            // does not exist yet.
            for store_schema in schema {
                if db.store(&store_schema.name).is_err() {
                    db.stores.push(MemoryStore::new(store_schema.clone()));
                }
            }
            db.version = version;
        }
        let version = db.version;
        drop(databases);
        Ok(Box::new(MemoryDbHandle {
            name: name.to_string(),
            version,
            databases: Arc::clone(&self.databases),
        }))
    }

    async fn delete_database(&self, name: &str) -> EngineResult<()> {
        self.databases.lock().remove(name);
        Ok(())
    }
}

struct MemoryDbHandle {
    name: String,
    version: u64,
    databases: Arc<Mutex<HashMap<String, MemoryDatabase>>>,
}

impl MemoryDbHandle {
    fn with_db<T>(
        &self,
        f: impl FnOnce(&MemoryDatabase) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let databases = self.databases.lock();
        let db = databases
            .get(&self.name)
            .ok_or_else(|| EngineError::NotFound(format!("database {:?}", self.name)))?;
        f(db)
    }
}

#[async_trait]
impl DatabaseHandle for MemoryDbHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    async fn store_names(&self) -> EngineResult<Vec<String>> {
        self.with_db(|db| Ok(db.stores.iter().map(|s| s.schema.name.clone()).collect()))
    }

    async fn store_schema(&self, store: &str) -> EngineResult<StoreSchema> {
        self.with_db(|db| Ok(db.store(store)?.schema.clone()))
    }

    async fn get_all_records(&self, store: &str) -> EngineResult<Vec<Value>> {
        self.with_db(|db| {
            Ok(db
                .store(store)?
                .records
                .iter()
                .map(|(_, v)| v.clone())
                .collect())
        })
    }

    async fn get_all_keys(&self, store: &str) -> EngineResult<Vec<Value>> {
        self.with_db(|db| {
            Ok(db
                .store(store)?
                .records
                .iter()
                .map(|(k, _)| k.clone())
                .collect())
        })
    }

    async fn put(&self, store: &str, value: &Value, key: Option<&Value>) -> EngineResult<()> {
        let mut databases = self.databases.lock();
        let db = databases
            .get_mut(&self.name)
            .ok_or_else(|| EngineError::NotFound(format!("database {:?}", self.name)))?;
        let store = db.store_mut(store)?;

        let mut value = value.clone();
        let key = match (&store.schema.key_path, key) {
            // Out-of-line store with an explicit key.
            (None, Some(k)) => k.clone(),
            // Out-of-line auto-increment store without a key.
            (None, None) if store.schema.auto_increment => {
                store.auto_counter += 1;
                Value::from(store.auto_counter)
            }
            (None, None) => {
                return Err(EngineError::Constraint(
                    "out-of-line store requires an explicit key".into(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(EngineError::Constraint(
                    "in-line keyed store rejects explicit keys".into(),
                ))
            }
            (Some(key_path), None) => match extract_key(&value, key_path) {
                Some(k) => k,
                None if store.schema.auto_increment => {
                    store.auto_counter += 1;
                    let generated = Value::from(store.auto_counter);
                    if let KeyPath::Single(path) = key_path {
                        if let Some(obj) = value.as_object_mut() {
                            obj.insert(path.clone(), generated.clone());
                        }
                    }
                    generated
                }
                None => {
                    return Err(EngineError::Constraint(
                        "record has no value at the declared key path".into(),
                    ))
                }
            },
        };

        store.insert(key, value)
    }

    async fn close(&self) {}
}

#[derive(Debug, Default)]
struct MemoryCache {
    /// Entries in insertion order; put replaces in place.
    entries: Vec<(String, FetchedResponse)>,
}

/// In-memory Cache API storage for one origin.
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: Arc<Mutex<Vec<(String, MemoryCache)>>>,
    /// URLs whose `put` fails, for item-level failure tests.
    fail_put_urls: Mutex<HashSet<String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `put` fail for one URL in every cache.
    pub fn fail_put_for(&self, url: &str) {
        self.fail_put_urls.lock().insert(url.to_string());
    }

    /// Seed one entry, creating the cache if needed.
    pub fn seed(&self, cache: &str, url: &str, response: FetchedResponse) {
        let mut caches = self.caches.lock();
        if !caches.iter().any(|(n, _)| n == cache) {
            caches.push((cache.to_string(), MemoryCache::default()));
        }
        let slot = caches
            .iter_mut()
            .find(|(n, _)| n == cache)
            .map(|(_, c)| c)
            .unwrap();
        slot.entries.push((url.to_string(), response));
    }

    pub fn entry_count(&self, cache: &str) -> usize {
        self.caches
            .lock()
            .iter()
            .find(|(n, _)| n == cache)
            .map_or(0, |(_, c)| c.entries.len())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn cache_names(&self) -> EngineResult<Vec<String>> {
        Ok(self.caches.lock().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn open(&self, name: &str) -> EngineResult<Box<dyn CacheArea>> {
        {
            let mut caches = self.caches.lock();
            if !caches.iter().any(|(n, _)| n == name) {
                caches.push((name.to_string(), MemoryCache::default()));
            }
        }
        Ok(Box::new(MemoryCacheHandle {
            name: name.to_string(),
            caches: Arc::clone(&self.caches),
            fail_put_urls: self.fail_put_urls.lock().clone(),
        }))
    }

    async fn delete(&self, name: &str) -> EngineResult<()> {
        self.caches.lock().retain(|(n, _)| n != name);
        Ok(())
    }
}

struct MemoryCacheHandle {
    name: String,
    caches: Arc<Mutex<Vec<(String, MemoryCache)>>>,
    fail_put_urls: HashSet<String>,
}

#[async_trait]
impl CacheArea for MemoryCacheHandle {
    async fn keys(&self) -> EngineResult<Vec<String>> {
        let caches = self.caches.lock();
        let cache = caches
            .iter()
            .find(|(n, _)| n == &self.name)
            .ok_or_else(|| EngineError::NotFound(format!("cache {:?}", self.name)))?;
        Ok(cache.1.entries.iter().map(|(url, _)| url.clone()).collect())
    }

    async fn match_url(&self, url: &str) -> EngineResult<Option<FetchedResponse>> {
        let caches = self.caches.lock();
        let cache = caches
            .iter()
            .find(|(n, _)| n == &self.name)
            .ok_or_else(|| EngineError::NotFound(format!("cache {:?}", self.name)))?;
        Ok(cache
            .1
            .entries
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, r)| r.clone()))
    }

    async fn put(&self, url: &str, response: FetchedResponse) -> EngineResult<()> {
        if self.fail_put_urls.contains(url) {
            return Err(EngineError::Backend(format!("put failed for {url:?}")));
        }
        let mut caches = self.caches.lock();
        let cache = caches
            .iter_mut()
            .find(|(n, _)| n == &self.name)
            .ok_or_else(|| EngineError::NotFound(format!("cache {:?}", self.name)))?;
        match cache.1.entries.iter_mut().find(|(u, _)| u == url) {
            Some((_, existing)) => *existing = response,
            None => cache.1.entries.push((url.to_string(), response)),
        }
        Ok(())
    }
}

/// All three engines for one origin, bundled for tests and simulation.
pub struct MemoryOrigin {
    pub origin: String,
    pub local: Arc<MemoryKeyValueArea>,
    pub indexed_db: Arc<MemoryIndexedDb>,
    pub cache: Arc<MemoryCacheStorage>,
}

impl MemoryOrigin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            local: Arc::new(MemoryKeyValueArea::new()),
            indexed_db: Arc::new(MemoryIndexedDb::new()),
            cache: Arc::new(MemoryCacheStorage::new()),
        }
    }

    pub fn context(&self) -> OriginContext {
        OriginContext {
            origin: self.origin.clone(),
            local_storage: self.local.clone(),
            indexed_db: Some(self.indexed_db.clone()),
            cache_storage: Some(self.cache.clone()),
        }
    }
}
