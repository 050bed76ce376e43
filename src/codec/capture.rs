//! Capture side of the codec

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::engine::{
    CacheArea, CacheStorage, DatabaseHandle, EngineError, IndexedDbFactory, KeyValueArea,
    OriginContext,
};
use crate::model::{
    BodyEncoding, CacheEntry, CacheSnapshot, CachedResponse, DatabaseSnapshot,
    ObjectStoreSnapshot, OriginSnapshot, StoreRecord,
};

use super::b64;
use super::governor::{Admission, CaptureSizeGovernor, SizeBudget};
use super::{Category, ItemFailure};

/// Which categories to capture, and the cache byte budget.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub local_storage: bool,
    pub indexed_db: bool,
    pub cache_api: bool,
    pub budget: SizeBudget,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            local_storage: true,
            indexed_db: true,
            cache_api: true,
            budget: SizeBudget::default(),
        }
    }
}

/// Result of one origin's capture sweep.
///
/// The sweep never aborts for a single item; failed items are collected
/// here and the snapshot holds everything that survived.
#[derive(Debug)]
pub struct CaptureOutcome {
    pub snapshot: OriginSnapshot,
    pub failures: Vec<ItemFailure>,
    /// True when the run byte ceiling truncated cache capture.
    pub truncated: bool,
}

impl CaptureOutcome {
    /// Whether anything was skipped due to item-level failures.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Capture one origin with a private governor built from the options.
pub async fn capture(ctx: &OriginContext, options: &CaptureOptions) -> CaptureOutcome {
    let governor = Mutex::new(CaptureSizeGovernor::new(options.budget));
    capture_with_governor(ctx, options, &governor).await
}

/// Capture several origins concurrently under one shared byte budget.
/// One origin's failures never cancel the others.
pub async fn capture_all(
    contexts: &[OriginContext],
    options: &CaptureOptions,
) -> Vec<CaptureOutcome> {
    let governor = Mutex::new(CaptureSizeGovernor::new(options.budget));
    futures::future::join_all(
        contexts
            .iter()
            .map(|ctx| capture_with_governor(ctx, options, &governor)),
    )
    .await
}

/// Capture one origin, charging cache bytes to a shared run governor.
pub async fn capture_with_governor(
    ctx: &OriginContext,
    options: &CaptureOptions,
    governor: &Mutex<CaptureSizeGovernor>,
) -> CaptureOutcome {
    let mut failures = Vec::new();
    let mut snapshot = OriginSnapshot::new(ctx.origin.clone());
    let mut truncated = false;

    if options.local_storage {
        snapshot.local_storage =
            Some(capture_local_storage(ctx.local_storage.as_ref(), &mut failures).await);
    }

    if options.indexed_db {
        if let Some(factory) = &ctx.indexed_db {
            snapshot.databases = capture_databases(factory.as_ref(), &mut failures).await;
        }
    }

    if options.cache_api {
        if let Some(storage) = &ctx.cache_storage {
            let (caches, hit_ceiling) =
                capture_caches(storage.as_ref(), governor, &mut failures).await;
            snapshot.caches = caches;
            truncated = hit_ceiling;
        }
    }

    CaptureOutcome {
        snapshot,
        failures,
        truncated,
    }
}

/// Enumerate every key in native order and read each value. A failed read
/// drops that key only.
async fn capture_local_storage(
    area: &dyn KeyValueArea,
    failures: &mut Vec<ItemFailure>,
) -> std::collections::HashMap<String, String> {
    let mut entries = std::collections::HashMap::new();

    let keys = match area.keys().await {
        Ok(keys) => keys,
        Err(err) => {
            warn!(error = %err, "localStorage key enumeration failed");
            failures.push(ItemFailure::new(Category::LocalStorage, "<keys>", err));
            return entries;
        }
    };

    for key in keys {
        match area.get(&key).await {
            Ok(Some(value)) => {
                entries.insert(key, value);
            }
            Ok(None) => {
                // Key vanished between enumeration and read; skip.
            }
            Err(err) => {
                warn!(key = %key, error = %err, "localStorage read failed, key omitted");
                failures.push(ItemFailure::new(Category::LocalStorage, key, err));
            }
        }
    }

    entries
}

async fn capture_databases(
    factory: &dyn IndexedDbFactory,
    failures: &mut Vec<ItemFailure>,
) -> Option<Vec<DatabaseSnapshot>> {
    let infos = match factory.databases().await {
        Ok(infos) => infos,
        Err(EngineError::Unsupported(what)) => {
            // Documented capability gap, not an error.
            debug!(capability = what, "IndexedDB capture unavailable, skipping category");
            return None;
        }
        Err(err) => {
            warn!(error = %err, "database enumeration failed");
            failures.push(ItemFailure::new(Category::IndexedDb, "<databases>", err));
            return None;
        }
    };

    let mut databases = Vec::with_capacity(infos.len());
    for info in infos {
        match capture_database(factory, &info.name, failures).await {
            Ok(db) => databases.push(db),
            Err(err) => {
                warn!(database = %info.name, error = %err, "database capture failed");
                failures.push(ItemFailure::new(Category::IndexedDb, info.name, err));
            }
        }
    }
    Some(databases)
}

async fn capture_database(
    factory: &dyn IndexedDbFactory,
    name: &str,
    failures: &mut Vec<ItemFailure>,
) -> Result<DatabaseSnapshot, EngineError> {
    // Open without a version so the open can never trigger an upgrade.
    let db = factory.open(name).await?;
    let version = db.version();

    // The connection must be released on every exit path.
    let stores = capture_stores(db.as_ref(), name, failures).await;
    db.close().await;

    Ok(DatabaseSnapshot {
        name: name.to_string(),
        version,
        object_stores: stores?,
    })
}

async fn capture_stores(
    db: &dyn DatabaseHandle,
    db_name: &str,
    failures: &mut Vec<ItemFailure>,
) -> Result<Vec<ObjectStoreSnapshot>, EngineError> {
    let names = db.store_names().await?;
    let mut stores = Vec::with_capacity(names.len());

    for store_name in names {
        match capture_store(db, &store_name).await {
            Ok(store) => stores.push(store),
            Err(err) => {
                warn!(
                    database = db_name,
                    store = %store_name,
                    error = %err,
                    "object store capture failed"
                );
                failures.push(ItemFailure::new(
                    Category::IndexedDb,
                    format!("{db_name}/{store_name}"),
                    err,
                ));
            }
        }
    }

    Ok(stores)
}

async fn capture_store(
    db: &dyn DatabaseHandle,
    store_name: &str,
) -> Result<ObjectStoreSnapshot, EngineError> {
    let schema = db.store_schema(store_name).await?;

    // Fetch records and keys as two concurrent requests against the same
    // unmodified store; both iterate ascending primary-key order.
    let (records, keys) = tokio::join!(
        db.get_all_records(store_name),
        db.get_all_keys(store_name)
    );
    let (records, keys) = (records?, keys?);

    // Positional pairing is only sound when both requests observed the
    // same point-in-time state. A length mismatch means a writer landed
    // between them; fail this store instead of silently mis-pairing.
    if records.len() != keys.len() {
        return Err(EngineError::Backend(format!(
            "record/key count mismatch ({} vs {}), store modified during capture",
            records.len(),
            keys.len()
        )));
    }

    let out_of_line = schema.key_path.is_none();
    let records: Vec<StoreRecord> = records
        .into_iter()
        .zip(keys)
        .map(|(value, key)| StoreRecord {
            // In-line keyed stores embed the key in the value.
            key: out_of_line.then_some(key),
            value,
        })
        .collect();

    Ok(ObjectStoreSnapshot {
        name: schema.name,
        key_path: schema.key_path,
        auto_increment: schema.auto_increment,
        indexes: schema.indexes,
        records,
    })
}

async fn capture_caches(
    storage: &dyn CacheStorage,
    governor: &Mutex<CaptureSizeGovernor>,
    failures: &mut Vec<ItemFailure>,
) -> (Option<Vec<CacheSnapshot>>, bool) {
    let names = match storage.cache_names().await {
        Ok(names) => names,
        Err(EngineError::Unsupported(what)) => {
            debug!(capability = what, "Cache API unavailable, skipping category");
            return (None, false);
        }
        Err(err) => {
            warn!(error = %err, "cache enumeration failed");
            failures.push(ItemFailure::new(Category::CacheApi, "<caches>", err));
            return (None, false);
        }
    };

    let mut caches = Vec::new();
    let mut truncated = false;

    'run: for name in names {
        let cache = match storage.open(&name).await {
            Ok(cache) => cache,
            Err(err) => {
                warn!(cache = %name, error = %err, "cache open failed");
                failures.push(ItemFailure::new(Category::CacheApi, name, err));
                continue;
            }
        };

        let urls = match cache.keys().await {
            Ok(urls) => urls,
            Err(err) => {
                warn!(cache = %name, error = %err, "cache key enumeration failed");
                failures.push(ItemFailure::new(Category::CacheApi, name, err));
                continue;
            }
        };

        let mut entries = Vec::new();
        let mut kept_bytes: u64 = 0;

        for url in urls {
            let response = match cache.match_url(&url).await {
                Ok(Some(response)) => response,
                Ok(None) => continue,
                Err(err) => {
                    warn!(url = %url, error = %err, "cache match failed, entry skipped");
                    failures.push(ItemFailure::new(Category::CacheApi, url, err));
                    continue;
                }
            };

            // Header pre-filter: skip clearly oversized entries without
            // materializing their bodies. The verdict is taken with the
            // guard released so the truncation path can re-lock to commit.
            let admission = governor
                .lock()
                .admit_hint(kept_bytes, response.content_length_hint());
            match admission {
                Admission::Admit => {}
                Admission::EntryTooLarge => {
                    debug!(url = %url, "entry over per-entry ceiling (header hint), skipped");
                    continue;
                }
                Admission::RunExhausted => {
                    debug!(cache = %name, "run byte ceiling reached, truncating capture");
                    truncated = true;
                    governor.lock().commit_cache(kept_bytes);
                    if !entries.is_empty() {
                        caches.push(finish_cache(&name, entries, kept_bytes));
                    }
                    break 'run;
                }
            }

            let (body, encoding, body_bytes) = serialize_body(response.body.as_deref());

            let admission = governor.lock().admit(kept_bytes, body_bytes);
            match admission {
                Admission::Admit => {}
                Admission::EntryTooLarge => {
                    debug!(url = %url, bytes = body_bytes, "entry over per-entry ceiling, skipped");
                    continue;
                }
                Admission::RunExhausted => {
                    debug!(cache = %name, "run byte ceiling reached, truncating capture");
                    truncated = true;
                    governor.lock().commit_cache(kept_bytes);
                    if !entries.is_empty() {
                        caches.push(finish_cache(&name, entries, kept_bytes));
                    }
                    break 'run;
                }
            }

            kept_bytes += body_bytes;
            entries.push(CacheEntry {
                url,
                response: CachedResponse {
                    status: response.status,
                    status_text: response.status_text,
                    headers: response.headers,
                    body,
                    body_encoding: encoding,
                    kind: response.kind,
                },
            });
        }

        governor.lock().commit_cache(kept_bytes);

        // A cache contributing nothing is omitted, not recorded empty.
        if !entries.is_empty() {
            caches.push(finish_cache(&name, entries, kept_bytes));
        }
    }

    (Some(caches), truncated)
}

fn finish_cache(name: &str, entries: Vec<CacheEntry>, kept_bytes: u64) -> CacheSnapshot {
    CacheSnapshot {
        name: name.to_string(),
        entries,
        approximate_size_bytes: kept_bytes,
    }
}

/// Serialize a body as text when it is valid UTF-8, falling back to
/// chunked base64 otherwise. Text is preferred: most web assets are
/// representable as text, and base64 inflates size by a third.
fn serialize_body(body: Option<&[u8]>) -> (Option<String>, BodyEncoding, u64) {
    match body {
        None => (None, BodyEncoding::Text, 0),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => {
                let text = text.to_string();
                let len = text.len() as u64;
                (Some(text), BodyEncoding::Text, len)
            }
            Err(_) => {
                let encoded = b64::encode_chunked(bytes);
                let len = encoded.len() as u64;
                (Some(encoded), BodyEncoding::Base64, len)
            }
        },
    }
}
