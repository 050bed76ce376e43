//! Shared test utilities for privstash
//!
//! Fixtures for seeding in-memory origins with realistic storage state
//! and building cache responses of controlled sizes.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::json;

use privstash::engine::memory::MemoryOrigin;
use privstash::engine::{
    DatabaseHandle, FetchedResponse, IndexedDbFactory, KeyValueArea, StoreSchema,
};
use privstash::model::{IndexSnapshot, KeyPath};

pub const MIB: usize = 1024 * 1024;

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

/// Install the test tracing subscriber once; set `RUST_LOG` to see codec
/// and coordinator logs while debugging a test.
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// A text response body of exactly `size` bytes.
pub fn text_response(size: usize) -> FetchedResponse {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "text/plain".to_string());
    headers.insert("content-length".to_string(), size.to_string());
    FetchedResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers,
        body: Some(vec![b'x'; size]),
        kind: "basic".to_string(),
    }
}

/// A binary (non-UTF-8) response body of `size` bytes.
pub fn binary_response(size: usize) -> FetchedResponse {
    let mut body = vec![0u8; size];
    if !body.is_empty() {
        body[0] = 0xff;
    }
    FetchedResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers: HashMap::new(),
        body: Some(body),
        kind: "basic".to_string(),
    }
}

/// An origin with localStorage entries and one database holding two
/// stores: one with an explicit in-line key path, one with out-of-line
/// auto-increment keys.
pub async fn seeded_origin(origin: &str) -> MemoryOrigin {
    let fixture = MemoryOrigin::new(origin);

    fixture.local.set("theme", "dark").await.unwrap();
    fixture.local.set("sessionToken", "tok-123").await.unwrap();

    let schema = [
        StoreSchema {
            name: "people".to_string(),
            key_path: Some(KeyPath::Single("id".to_string())),
            auto_increment: false,
            indexes: vec![IndexSnapshot {
                name: "by_email".to_string(),
                key_path: KeyPath::Single("email".to_string()),
                unique: true,
                multi_entry: false,
            }],
        },
        StoreSchema {
            name: "events".to_string(),
            key_path: None,
            auto_increment: true,
            indexes: vec![],
        },
    ];
    let db = fixture
        .indexed_db
        .open_with_schema("app", 2, &schema)
        .await
        .unwrap();
    db.put("people", &json!({"id": 1, "email": "ada@a.test"}), None)
        .await
        .unwrap();
    db.put("people", &json!({"id": 2, "email": "alan@a.test"}), None)
        .await
        .unwrap();
    db.put("events", &json!({"kind": "login"}), None).await.unwrap();
    db.put("events", &json!({"kind": "click"}), None).await.unwrap();
    db.close().await;

    fixture
}
