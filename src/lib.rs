pub mod backup;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod model;
pub mod repo;
pub mod router;

pub use backup::{BackupDocument, BackupError, BackupV2};
pub use codec::{
    capture, capture_all, restore, CaptureOptions, CaptureOutcome, CaptureSizeGovernor,
    RestoreOptions, RestoreOutcome, SizeBudget,
};
pub use config::Settings;
pub use coordinator::{CoordinatorConfig, RestoreCoordinator, RestoreTransport, TabId};
pub use engine::{EngineError, OriginContext};
pub use model::{CookieRecord, OriginSnapshot};
pub use repo::{BlobStore, CategoryUpdate, FileBlobStore, MemoryBlobStore, SnapshotStore};
pub use router::{Request, RequestRouter, Response};
