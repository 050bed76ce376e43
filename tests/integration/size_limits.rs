//! Size governance during cache capture

use privstash::codec::{capture, capture_all, CaptureOptions, SizeBudget};
use privstash::engine::memory::MemoryOrigin;

use super::common::{binary_response, text_response, MIB};

fn options_with_run_ceiling(mib: u64) -> CaptureOptions {
    CaptureOptions {
        budget: SizeBudget::with_run_ceiling_mib(mib),
        ..Default::default()
    }
}

#[tokio::test]
async fn run_ceiling_truncates_later_caches() {
    super::common::init_tracing();
    let origin = MemoryOrigin::new("https://a.test");
    origin.cache.seed("one", "https://a.test/1", text_response(4 * MIB));
    origin.cache.seed("two", "https://a.test/2", text_response(4 * MIB));
    origin.cache.seed("three", "https://a.test/3", text_response(4 * MIB));

    let outcome = capture(&origin.context(), &options_with_run_ceiling(10)).await;
    assert!(outcome.truncated);

    let caches = outcome.snapshot.caches.unwrap();
    // First two caches kept whole; the third would blow the ceiling and
    // is absent rather than partially captured.
    let names: Vec<&str> = caches.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["one", "two"]);

    let total: u64 = caches.iter().map(|c| c.approximate_size_bytes).sum();
    assert!(total <= 10 * MIB as u64);
}

#[tokio::test]
async fn per_entry_ceiling_skips_only_the_oversized_entry() {
    let origin = MemoryOrigin::new("https://a.test");
    origin.cache.seed("assets", "https://a.test/big", text_response(6 * MIB));
    origin.cache.seed("assets", "https://a.test/small", text_response(1 * MIB));

    let outcome = capture(&origin.context(), &CaptureOptions::default()).await;
    assert!(!outcome.truncated);

    let caches = outcome.snapshot.caches.unwrap();
    assert_eq!(caches.len(), 1);
    let urls: Vec<&str> = caches[0].entries.iter().map(|e| e.url.as_str()).collect();
    // The 6 MiB entry never appears; its sibling does.
    assert_eq!(urls, vec!["https://a.test/small"]);
}

#[tokio::test]
async fn oversized_entry_without_header_hint_is_still_skipped() {
    let origin = MemoryOrigin::new("https://a.test");
    // Binary response carries no content-length header, so only the
    // decoded-size check can reject it.
    origin.cache.seed("assets", "https://a.test/blob", binary_response(6 * MIB));
    origin.cache.seed("assets", "https://a.test/ok", binary_response(1024));

    let outcome = capture(&origin.context(), &CaptureOptions::default()).await;
    let caches = outcome.snapshot.caches.unwrap();
    assert_eq!(caches[0].entries.len(), 1);
    assert_eq!(caches[0].entries[0].url, "https://a.test/ok");
}

#[tokio::test]
async fn cache_with_no_surviving_entries_is_omitted() {
    let origin = MemoryOrigin::new("https://a.test");
    origin.cache.seed("huge", "https://a.test/big", text_response(6 * MIB));
    origin.cache.seed("fine", "https://a.test/ok", text_response(1024));

    let outcome = capture(&origin.context(), &CaptureOptions::default()).await;
    let caches = outcome.snapshot.caches.unwrap();
    // "huge" contributed nothing and is not recorded as an empty cache.
    let names: Vec<&str> = caches.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["fine"]);
}

#[tokio::test]
async fn run_ceiling_spans_origins_in_one_run() {
    let a = MemoryOrigin::new("https://a.test");
    let b = MemoryOrigin::new("https://b.test");
    a.cache.seed("assets", "https://a.test/1", text_response(4 * MIB));
    b.cache.seed("assets", "https://b.test/1", text_response(4 * MIB));

    let contexts = vec![a.context(), b.context()];
    let outcomes = capture_all(&contexts, &options_with_run_ceiling(6)).await;

    let kept: u64 = outcomes
        .iter()
        .filter_map(|o| o.snapshot.caches.as_ref())
        .flatten()
        .map(|c| c.approximate_size_bytes)
        .sum();
    // The shared governor admits only one of the two 4 MiB caches.
    assert!(kept <= 6 * MIB as u64);
    assert!(outcomes.iter().any(|o| o.truncated));
}
