//! Origin storage codec
//!
//! Capture serializes one origin's localStorage, IndexedDB, and Cache API
//! state into an [`OriginSnapshot`](crate::model::OriginSnapshot); restore
//! replays a snapshot into a fresh origin context. Both are best-effort
//! sweeps: a single key, record, or cache entry failing is logged and
//! skipped, never fatal to the sibling items or the sweep as a whole.

pub mod b64;
mod capture;
pub mod governor;
mod restore;

pub use capture::{capture, capture_all, capture_with_governor, CaptureOptions, CaptureOutcome};
pub use governor::{Admission, CaptureSizeGovernor, SizeBudget};
pub use restore::{restore, CategoryOutcome, RestoreOptions, RestoreOutcome};

use std::fmt;

/// The three storage categories the codec handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    LocalStorage,
    IndexedDb,
    CacheApi,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::LocalStorage => "localStorage",
            Category::IndexedDb => "indexedDB",
            Category::CacheApi => "cacheStorage",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item that failed during a capture or restore sweep.
///
/// Collected into the sweep outcome instead of aborting it; the caller
/// decides whether the aggregate is worth reporting.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub category: Category,
    /// Key, record key, store, database, or URL that failed.
    pub item: String,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(category: Category, item: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            category,
            item: item.into(),
            reason: reason.to_string(),
        }
    }
}
