//! Capture/restore round-trip fidelity

use privstash::codec::{capture, restore, CaptureOptions, RestoreOptions};
use privstash::engine::memory::MemoryOrigin;
use privstash::engine::{DatabaseHandle, IndexedDbFactory, KeyValueArea};
use privstash::model::KeyPath;

use super::common::seeded_origin;

#[tokio::test]
async fn local_storage_roundtrips_byte_identical() {
    super::common::init_tracing();
    let source = seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;
    assert!(!captured.is_partial());

    let target = MemoryOrigin::new("https://a.test");
    let outcome = restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions::default(),
    )
    .await;
    assert!(outcome.is_clean());

    // Re-capturing the restored context yields the same key/value map.
    let recaptured = capture(&target.context(), &CaptureOptions::default()).await;
    assert_eq!(
        recaptured.snapshot.local_storage,
        captured.snapshot.local_storage
    );
}

#[tokio::test]
async fn restore_is_idempotent_without_clear_first() {
    let source = seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;

    let target = MemoryOrigin::new("https://a.test");
    let options = RestoreOptions { clear_first: false };
    restore(&target.context(), &captured.snapshot, &options).await;
    let after_once = target.local.entries();

    restore(&target.context(), &captured.snapshot, &options).await;
    let after_twice = target.local.entries();

    // Keys are overwritten, not duplicated.
    assert_eq!(after_once.len(), after_twice.len());
    let mut once_sorted = after_once.clone();
    let mut twice_sorted = after_twice.clone();
    once_sorted.sort();
    twice_sorted.sort();
    assert_eq!(once_sorted, twice_sorted);
}

#[tokio::test]
async fn clear_first_replaces_existing_keys() {
    let source = seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;

    let target = MemoryOrigin::new("https://a.test");
    target.local.set("stale", "leftover").await.unwrap();

    restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions { clear_first: true },
    )
    .await;

    assert_eq!(target.local.get("stale").await.unwrap(), None);
    assert_eq!(
        target.local.get("theme").await.unwrap().as_deref(),
        Some("dark")
    );
}

#[tokio::test]
async fn indexeddb_schema_survives_restore_and_recapture() {
    let source = seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;

    let target = MemoryOrigin::new("https://a.test");
    let outcome = restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions::default(),
    )
    .await;
    assert!(outcome.is_clean());

    let recaptured = capture(&target.context(), &CaptureOptions::default()).await;
    let databases = recaptured.snapshot.databases.unwrap();
    assert_eq!(databases.len(), 1);

    let db = &databases[0];
    assert_eq!(db.name, "app");
    assert_eq!(db.version, 2);

    let people = db.object_stores.iter().find(|s| s.name == "people").unwrap();
    assert_eq!(people.key_path, Some(KeyPath::Single("id".into())));
    assert!(!people.auto_increment);
    assert_eq!(people.indexes.len(), 1);
    assert_eq!(people.indexes[0].name, "by_email");
    assert!(people.indexes[0].unique);
    assert!(!people.indexes[0].multi_entry);

    let events = db.object_stores.iter().find(|s| s.name == "events").unwrap();
    assert_eq!(events.key_path, None);
    assert!(events.auto_increment);
}

#[tokio::test]
async fn indexeddb_records_and_keys_survive_roundtrip() {
    let source = seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;

    let target = MemoryOrigin::new("https://a.test");
    restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions::default(),
    )
    .await;

    let recaptured = capture(&target.context(), &CaptureOptions::default()).await;
    let original = captured.snapshot.databases.unwrap();
    let roundtripped = recaptured.snapshot.databases.unwrap();

    // Same records in the same ascending-key order, including explicit
    // keys on the out-of-line store.
    assert_eq!(original, roundtripped);
}

#[tokio::test]
async fn restore_wipes_existing_database_of_same_name() {
    let source = seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;

    // Target has a database named "app" with a divergent schema.
    let target = MemoryOrigin::new("https://a.test");
    let stale_schema = [privstash::engine::StoreSchema {
        name: "junk".to_string(),
        key_path: None,
        auto_increment: false,
        indexes: vec![],
    }];
    let db = target
        .indexed_db
        .open_with_schema("app", 9, &stale_schema)
        .await
        .unwrap();
    db.close().await;

    restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions::default(),
    )
    .await;

    // The recreated database matches the snapshot exactly; the stale
    // store and version are gone.
    let recaptured = capture(&target.context(), &CaptureOptions::default()).await;
    let databases = recaptured.snapshot.databases.unwrap();
    let db = databases.iter().find(|d| d.name == "app").unwrap();
    assert_eq!(db.version, 2);
    assert!(db.object_stores.iter().all(|s| s.name != "junk"));
}

#[tokio::test]
async fn cache_entries_roundtrip_text_and_binary() {
    let source = MemoryOrigin::new("https://a.test");
    source
        .cache
        .seed("assets", "https://a.test/app.js", super::common::text_response(64));
    source.cache.seed(
        "assets",
        "https://a.test/logo.png",
        super::common::binary_response(128),
    );

    let captured = capture(&source.context(), &CaptureOptions::default()).await;
    let caches = captured.snapshot.caches.as_ref().unwrap();
    assert_eq!(caches.len(), 1);
    assert_eq!(caches[0].entries.len(), 2);

    let target = MemoryOrigin::new("https://a.test");
    let outcome = restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions::default(),
    )
    .await;
    assert!(outcome.is_clean());

    // Bodies come back byte-identical through both encodings.
    let recaptured = capture(&target.context(), &CaptureOptions::default()).await;
    assert_eq!(recaptured.snapshot.caches, captured.snapshot.caches);
}
