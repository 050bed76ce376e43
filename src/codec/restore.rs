//! Restore side of the codec

use tracing::warn;

use crate::engine::{
    CacheArea, CacheStorage, DatabaseHandle, FetchedResponse, IndexedDbFactory, KeyValueArea,
    OriginContext, StoreSchema,
};
use crate::model::{
    BodyEncoding, CacheSnapshot, DatabaseSnapshot, ObjectStoreSnapshot, OriginSnapshot,
};

use super::b64;
use super::{Category, ItemFailure};

/// Options for a restore sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Clear existing localStorage keys before writing the snapshot's.
    pub clear_first: bool,
}

/// Per-category result of a restore sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryOutcome {
    /// Category absent from the snapshot or engine unavailable.
    Skipped,
    /// Category was attempted; counts of items written and items failed.
    Applied { restored: usize, failed: usize },
}

impl CategoryOutcome {
    pub fn failed_items(&self) -> usize {
        match self {
            CategoryOutcome::Skipped => 0,
            CategoryOutcome::Applied { failed, .. } => *failed,
        }
    }
}

/// Outcome of restoring one snapshot into one origin context.
#[derive(Debug)]
pub struct RestoreOutcome {
    pub local_storage: CategoryOutcome,
    pub indexed_db: CategoryOutcome,
    pub cache_storage: CategoryOutcome,
    pub failures: Vec<ItemFailure>,
}

impl RestoreOutcome {
    /// True when every attempted item was written.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Replay a snapshot into an origin context, category by category, with
/// per-item try/continue semantics throughout.
pub async fn restore(
    ctx: &OriginContext,
    snapshot: &OriginSnapshot,
    options: &RestoreOptions,
) -> RestoreOutcome {
    let mut failures = Vec::new();

    let local_storage = match &snapshot.local_storage {
        Some(entries) => {
            restore_local_storage(ctx.local_storage.as_ref(), entries, options, &mut failures)
                .await
        }
        None => CategoryOutcome::Skipped,
    };

    let indexed_db = match (&snapshot.databases, &ctx.indexed_db) {
        (Some(databases), Some(factory)) => {
            restore_databases(factory.as_ref(), databases, &mut failures).await
        }
        _ => CategoryOutcome::Skipped,
    };

    let cache_storage = match (&snapshot.caches, &ctx.cache_storage) {
        (Some(caches), Some(storage)) => {
            restore_caches(storage.as_ref(), caches, &mut failures).await
        }
        _ => CategoryOutcome::Skipped,
    };

    RestoreOutcome {
        local_storage,
        indexed_db,
        cache_storage,
        failures,
    }
}

/// Write every pair; keys are overwritten, never duplicated, so replaying
/// the same snapshot twice is idempotent.
async fn restore_local_storage(
    area: &dyn KeyValueArea,
    entries: &std::collections::HashMap<String, String>,
    options: &RestoreOptions,
    failures: &mut Vec<ItemFailure>,
) -> CategoryOutcome {
    if options.clear_first {
        if let Err(err) = area.clear().await {
            warn!(error = %err, "localStorage clear failed, writing over existing keys");
            failures.push(ItemFailure::new(Category::LocalStorage, "<clear>", err));
        }
    }

    let mut restored = 0;
    let mut failed = 0;
    for (key, value) in entries {
        match area.set(key, value).await {
            Ok(()) => restored += 1,
            Err(err) => {
                warn!(key = %key, error = %err, "localStorage write failed");
                failures.push(ItemFailure::new(Category::LocalStorage, key.clone(), err));
                failed += 1;
            }
        }
    }
    CategoryOutcome::Applied { restored, failed }
}

async fn restore_databases(
    factory: &dyn IndexedDbFactory,
    databases: &[DatabaseSnapshot],
    failures: &mut Vec<ItemFailure>,
) -> CategoryOutcome {
    let mut restored = 0;
    let mut failed = 0;

    for db in databases {
        match restore_database(factory, db, failures).await {
            Ok(records) => restored += records,
            Err(err) => {
                warn!(database = %db.name, error = %err, "database restore failed");
                failures.push(ItemFailure::new(Category::IndexedDb, db.name.clone(), err));
                failed += 1;
            }
        }
    }

    CategoryOutcome::Applied { restored, failed }
}

/// Restore is destructive-by-design per database: the existing database is
/// deleted outright so the recreated schema matches the snapshot exactly.
async fn restore_database(
    factory: &dyn IndexedDbFactory,
    db: &DatabaseSnapshot,
    failures: &mut Vec<ItemFailure>,
) -> Result<usize, crate::engine::EngineError> {
    factory.delete_database(&db.name).await?;

    let schema: Vec<StoreSchema> = db.object_stores.iter().map(schema_of).collect();
    let handle = factory
        .open_with_schema(&db.name, db.version, &schema)
        .await?;

    // Schema exists now; populate each store. One store failing does not
    // block the remaining stores.
    let mut restored = 0;
    for store in &db.object_stores {
        match populate_store(handle.as_ref(), store).await {
            Ok(count) => restored += count,
            Err(err) => {
                warn!(
                    database = %db.name,
                    store = %store.name,
                    error = %err,
                    "store population failed"
                );
                failures.push(ItemFailure::new(
                    Category::IndexedDb,
                    format!("{}/{}", db.name, store.name),
                    err,
                ));
            }
        }
    }

    handle.close().await;
    Ok(restored)
}

async fn populate_store(
    handle: &dyn DatabaseHandle,
    store: &ObjectStoreSnapshot,
) -> Result<usize, crate::engine::EngineError> {
    let out_of_line = store.out_of_line_keys();
    let mut count = 0;
    for record in &store.records {
        // Captured key for out-of-line stores; in-line stores carry the
        // key inside the value.
        let key = if out_of_line { record.key.as_ref() } else { None };
        handle.put(&store.name, &record.value, key).await?;
        count += 1;
    }
    Ok(count)
}

fn schema_of(store: &ObjectStoreSnapshot) -> StoreSchema {
    StoreSchema {
        name: store.name.clone(),
        key_path: store.key_path.clone(),
        auto_increment: store.auto_increment,
        indexes: store.indexes.clone(),
    }
}

async fn restore_caches(
    storage: &dyn CacheStorage,
    caches: &[CacheSnapshot],
    failures: &mut Vec<ItemFailure>,
) -> CategoryOutcome {
    let mut restored = 0;
    let mut failed = 0;

    for cache in caches {
        let area = match storage.open(&cache.name).await {
            Ok(area) => area,
            Err(err) => {
                warn!(cache = %cache.name, error = %err, "cache open failed");
                failures.push(ItemFailure::new(
                    Category::CacheApi,
                    cache.name.clone(),
                    err,
                ));
                failed += cache.entries.len();
                continue;
            }
        };

        for entry in &cache.entries {
            match rebuild_response(&entry.response) {
                Ok(response) => match area.put(&entry.url, response).await {
                    Ok(()) => restored += 1,
                    Err(err) => {
                        warn!(url = %entry.url, error = %err, "cache put failed, entry skipped");
                        failures.push(ItemFailure::new(
                            Category::CacheApi,
                            entry.url.clone(),
                            err,
                        ));
                        failed += 1;
                    }
                },
                Err(reason) => {
                    warn!(url = %entry.url, %reason, "cache body decode failed, entry skipped");
                    failures.push(ItemFailure::new(
                        Category::CacheApi,
                        entry.url.clone(),
                        reason,
                    ));
                    failed += 1;
                }
            }
        }
    }

    CategoryOutcome::Applied { restored, failed }
}

fn rebuild_response(response: &crate::model::CachedResponse) -> Result<FetchedResponse, String> {
    let body = match (&response.body, response.body_encoding) {
        (None, _) => None,
        (Some(text), BodyEncoding::Text) => Some(text.clone().into_bytes()),
        (Some(encoded), BodyEncoding::Base64) => {
            Some(b64::decode(encoded).map_err(|e| e.to_string())?)
        }
    };

    Ok(FetchedResponse {
        status: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.clone(),
        body,
        kind: response.kind.clone(),
    })
}
