//! End-to-end save/restore flow: capture into the repository, then
//! coordinator-driven delivery into a fresh private context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use privstash::codec::{capture, restore, CaptureOptions, RestoreOptions};
use privstash::coordinator::{
    CoordinatorConfig, RestoreCoordinator, RestoreTransport, TabId, TransportError,
};
use privstash::engine::memory::MemoryOrigin;
use privstash::engine::KeyValueArea;
use privstash::model::OriginSnapshot;
use privstash::repo::{CategoryUpdate, MemoryBlobStore, SnapshotStore};

/// Transport that restores delivered snapshots into per-tab in-memory
/// origins, the way the content-script side would.
struct PageTransport {
    tabs: Mutex<HashMap<TabId, Arc<MemoryOrigin>>>,
}

impl PageTransport {
    fn new() -> Self {
        Self {
            tabs: Mutex::new(HashMap::new()),
        }
    }

    fn open_tab(&self, tab: TabId, origin: Arc<MemoryOrigin>) {
        self.tabs.lock().insert(tab, origin);
    }
}

#[async_trait]
impl RestoreTransport for PageTransport {
    async fn tab_origin(&self, tab: TabId) -> Option<String> {
        self.tabs.lock().get(&tab).map(|o| o.origin.clone())
    }

    async fn deliver(
        &self,
        tab: TabId,
        snapshot: &OriginSnapshot,
        clear_first: bool,
    ) -> Result<(), TransportError> {
        let target = self
            .tabs
            .lock()
            .get(&tab)
            .cloned()
            .ok_or(TransportError::TabClosed)?;
        let options = RestoreOptions { clear_first };
        restore(&target.context(), snapshot, &options).await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn saved_origin_is_replayed_into_a_new_private_tab() {
    super::common::init_tracing();

    // Save: capture the origin and merge into the repository.
    let source = super::common::seeded_origin("https://a.test").await;
    let captured = capture(&source.context(), &CaptureOptions::default()).await;
    let store = SnapshotStore::new(MemoryBlobStore::new());
    store
        .merge_write("https://a.test", CategoryUpdate::from(captured.snapshot))
        .unwrap();

    // A new private tab reaches load-complete on the same origin.
    let fresh = Arc::new(MemoryOrigin::new("https://a.test"));
    let transport = Arc::new(PageTransport::new());
    transport.open_tab(1, fresh.clone());

    let coordinator = RestoreCoordinator::spawn(CoordinatorConfig::default(), transport);
    let snapshot = store.read_origin("https://a.test").unwrap().unwrap();
    coordinator.tab_ready(1, "https://a.test", snapshot);

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(
        fresh.local.get("theme").await.unwrap().as_deref(),
        Some("dark")
    );
    assert_eq!(fresh.indexed_db.database_names(), vec!["app"]);
    coordinator.shutdown();
}

#[tokio::test]
async fn poisoned_key_is_omitted_without_failing_the_sweep() {
    let origin = MemoryOrigin::new("https://a.test");
    origin.local.set("good", "1").await.unwrap();
    origin.local.set("bad", "2").await.unwrap();
    origin.local.set("alsoGood", "3").await.unwrap();
    origin.local.poison_key("bad");

    let outcome = capture(&origin.context(), &CaptureOptions::default()).await;
    assert!(outcome.is_partial());

    let local = outcome.snapshot.local_storage.unwrap();
    assert_eq!(local.len(), 2);
    assert!(local.contains_key("good"));
    assert!(local.contains_key("alsoGood"));
    assert!(!local.contains_key("bad"));
}

#[tokio::test]
async fn failing_cache_entry_leaves_siblings_restored() {
    let source = MemoryOrigin::new("https://a.test");
    source
        .cache
        .seed("assets", "https://a.test/ok", super::common::text_response(64));
    source
        .cache
        .seed("assets", "https://a.test/cursed", super::common::text_response(64));

    let captured = capture(&source.context(), &CaptureOptions::default()).await;

    let target = MemoryOrigin::new("https://a.test");
    target.cache.fail_put_for("https://a.test/cursed");

    let outcome = restore(
        &target.context(),
        &captured.snapshot,
        &RestoreOptions::default(),
    )
    .await;

    assert!(!outcome.is_clean());
    assert_eq!(outcome.cache_storage.failed_items(), 1);
    assert_eq!(target.cache.entry_count("assets"), 1);
}

#[tokio::test]
async fn missing_enumeration_api_skips_category_quietly() {
    let origin = MemoryOrigin::new("https://a.test");
    origin.local.set("k", "v").await.unwrap();

    let mut ctx = origin.context();
    ctx.indexed_db = Some(Arc::new(
        privstash::engine::memory::MemoryIndexedDb::without_enumeration(),
    ));

    let outcome = capture(&ctx, &CaptureOptions::default()).await;
    // Capability gap: no failure recorded, category simply absent.
    assert!(!outcome.is_partial());
    assert!(outcome.snapshot.databases.is_none());
    assert!(outcome.snapshot.local_storage.is_some());
}
