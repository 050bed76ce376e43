//! Backup import feeding the repository and the restore path

use privstash::backup::{self, BackupDocument};
use privstash::codec::{restore, RestoreOptions};
use privstash::engine::memory::MemoryOrigin;
use privstash::engine::KeyValueArea;
use privstash::repo::{CategoryUpdate, MemoryBlobStore, SnapshotStore};

use serde_json::json;

#[tokio::test]
async fn imported_backup_restores_into_a_context() {
    let store = SnapshotStore::new(MemoryBlobStore::new());
    let document = backup::parse(
        &json!({
            "version": 2,
            "timestamp": "2026-02-10T09:30:00Z",
            "cookies": [{
                "name": "sid",
                "value": "abc",
                "domain": ".a.test",
                "path": "/",
                "secure": true,
                "httpOnly": true
            }],
            "webStorage": {
                "https://a.test": {
                    "localStorage": {"theme": "dark"},
                    "indexedDB": [{
                        "name": "app",
                        "version": 1,
                        "objectStores": [{
                            "name": "kv",
                            "keyPath": "k",
                            "autoIncrement": false,
                            "indexes": [],
                            "records": [{"value": {"k": "a", "v": 1}}]
                        }]
                    }]
                }
            }
        })
        .to_string(),
    )
    .unwrap();

    assert_eq!(backup::import_web_storage(&document, &store).unwrap(), 1);
    assert_eq!(document.cookies().len(), 1);

    let snapshot = store.read_origin("https://a.test").unwrap().unwrap();
    let target = MemoryOrigin::new("https://a.test");
    let outcome = restore(&target.context(), &snapshot, &RestoreOptions::default()).await;
    assert!(outcome.is_clean());

    assert_eq!(
        target.local.get("theme").await.unwrap().as_deref(),
        Some("dark")
    );
    assert_eq!(target.indexed_db.database_names(), vec!["app"]);
}

#[test]
fn import_preserves_categories_the_backup_does_not_carry() {
    let store = SnapshotStore::new(MemoryBlobStore::new());

    // Repository already holds a localStorage category for the origin.
    let mut existing = std::collections::HashMap::new();
    existing.insert("stored".to_string(), "before".to_string());
    store
        .merge_write(
            "https://a.test",
            CategoryUpdate {
                local_storage: Some(existing),
                ..Default::default()
            },
        )
        .unwrap();

    // The backup carries only indexedDB for that origin.
    let document = backup::parse(
        &json!({
            "version": 2,
            "timestamp": "2026-02-10T09:30:00Z",
            "cookies": [],
            "webStorage": {
                "https://a.test": {
                    "indexedDB": [{
                        "name": "app",
                        "version": 1,
                        "objectStores": []
                    }]
                }
            }
        })
        .to_string(),
    )
    .unwrap();
    backup::import_web_storage(&document, &store).unwrap();

    let snapshot = store.read_origin("https://a.test").unwrap().unwrap();
    assert_eq!(snapshot.local_storage.unwrap()["stored"], "before");
    assert_eq!(snapshot.databases.unwrap()[0].name, "app");
}

#[test]
fn malformed_backup_imports_nothing() {
    let store = SnapshotStore::new(MemoryBlobStore::new());
    assert!(backup::parse(r#"{"cookies": "not a list"}"#).is_err());
    assert!(store.read_all().unwrap().is_empty());
}

#[test]
fn v1_roundtrip_through_export() {
    let document = backup::parse(
        &json!([{
            "name": "sid",
            "value": "abc",
            "domain": "a.test",
            "path": "/",
            "secure": false,
            "httpOnly": false,
            "hostOnly": true,
            "session": true
        }])
        .to_string(),
    )
    .unwrap();

    let BackupDocument::V1 { cookies } = document else {
        panic!("expected v1 document");
    };

    // Exports are always written as v2.
    let exported = backup::export(cookies, Default::default());
    let reparsed = backup::parse(&exported.to_json_pretty().unwrap()).unwrap();
    match reparsed {
        BackupDocument::V2(doc) => {
            assert_eq!(doc.version, 2);
            assert_eq!(doc.cookies.len(), 1);
            assert!(doc.cookies[0].host_only);
        }
        other => panic!("expected v2, got {other:?}"),
    }
}
