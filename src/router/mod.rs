//! Request router
//!
//! The message contract between the privileged controller and the
//! in-page codec, keyed by an `action` discriminator. Requests are a
//! tagged enum with an exhaustive handler mapping; every handler resolves
//! exactly once, and errors inside a handler become a `success: false`
//! response instead of propagating; an error thrown out of an async
//! message handler looks like a dropped connection to the caller.

pub mod autocapture;

pub use autocapture::AutoCaptureState;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::{self, CaptureOptions, SizeBudget};
use crate::config::Settings;
use crate::engine::{CacheStorage, EngineError, IndexedDbFactory, KeyValueArea, OriginContext};
use crate::model::OriginSnapshot;

/// Requests the controller can send to a page context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetStorageData {
        #[serde(default, rename = "includeCache")]
        include_cache: bool,
        /// Run ceiling override in MiB.
        #[serde(
            default,
            rename = "cacheSizeLimit",
            skip_serializing_if = "Option::is_none"
        )]
        cache_size_limit: Option<u64>,
    },
    SetStorageData {
        data: OriginSnapshot,
        #[serde(default, rename = "clearFirst")]
        clear_first: bool,
    },
    ClearStorageData,
    StartAutoCapture,
    StopAutoCapture,
}

/// Responses back to the controller: captured storage data, or an
/// acknowledgement with a success flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    StorageData(Box<OriginSnapshot>),
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Response::Ack {
            success: false,
            error: Some(error.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        match self {
            Response::StorageData(_) => true,
            Response::Ack { success, .. } => *success,
        }
    }
}

/// Per-page-context request handler.
///
/// Owns the page's origin context and the auto-capture listener state for
/// that context.
pub struct RequestRouter {
    ctx: OriginContext,
    settings: Settings,
    auto_capture: Mutex<AutoCaptureState>,
}

impl RequestRouter {
    pub fn new(ctx: OriginContext, settings: Settings) -> Self {
        Self {
            ctx,
            settings,
            auto_capture: Mutex::new(AutoCaptureState::default()),
        }
    }

    pub fn origin(&self) -> &str {
        &self.ctx.origin
    }

    /// Dispatch one request. Total: never panics through, never errors
    /// out of the handler.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetStorageData {
                include_cache,
                cache_size_limit,
            } => self.handle_get(include_cache, cache_size_limit).await,
            Request::SetStorageData { data, clear_first } => {
                self.handle_set(data, clear_first).await
            }
            Request::ClearStorageData => match self.clear_storage().await {
                Ok(()) => Response::ok(),
                Err(err) => {
                    warn!(origin = %self.ctx.origin, error = %err, "clearStorageData failed");
                    Response::failure(err)
                }
            },
            Request::StartAutoCapture => {
                self.auto_capture.lock().start();
                Response::ok()
            }
            Request::StopAutoCapture => {
                self.auto_capture.lock().stop();
                Response::ok()
            }
        }
    }

    /// A storage mutation was observed in the page. Returns the capture
    /// options to run with when the debounce window admits a capture.
    pub fn on_storage_mutation(&self) -> Option<CaptureOptions> {
        if self.auto_capture.lock().on_mutation() {
            Some(self.capture_options(true, None))
        } else {
            None
        }
    }

    async fn handle_get(&self, include_cache: bool, cache_size_limit: Option<u64>) -> Response {
        let options = self.capture_options(include_cache, cache_size_limit);
        let outcome = codec::capture(&self.ctx, &options).await;
        if outcome.is_partial() {
            debug!(
                origin = %self.ctx.origin,
                failed_items = outcome.failures.len(),
                "capture completed with skipped items"
            );
        }
        Response::StorageData(Box::new(outcome.snapshot))
    }

    async fn handle_set(&self, data: OriginSnapshot, clear_first: bool) -> Response {
        let options = codec::RestoreOptions { clear_first };
        let outcome = codec::restore(&self.ctx, &data, &options).await;
        if !outcome.is_clean() {
            debug!(
                origin = %self.ctx.origin,
                failed_items = outcome.failures.len(),
                "restore completed with skipped items"
            );
        }
        Response::ok()
    }

    /// Wipe the page's storage: localStorage, every enumerable database,
    /// every cache.
    async fn clear_storage(&self) -> Result<(), EngineError> {
        self.ctx.local_storage.clear().await?;

        if let Some(factory) = &self.ctx.indexed_db {
            match factory.databases().await {
                Ok(infos) => {
                    for info in infos {
                        factory.delete_database(&info.name).await?;
                    }
                }
                Err(EngineError::Unsupported(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if let Some(storage) = &self.ctx.cache_storage {
            match storage.cache_names().await {
                Ok(names) => {
                    for name in names {
                        storage.delete(&name).await?;
                    }
                }
                Err(EngineError::Unsupported(_)) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    fn capture_options(&self, include_cache: bool, cache_size_limit: Option<u64>) -> CaptureOptions {
        let mut options = self.settings.capture_options();
        // The request can narrow the categories, never widen them.
        options.cache_api = options.cache_api && include_cache;
        if let Some(mib) = cache_size_limit {
            options.budget = SizeBudget::with_run_ceiling_mib(mib);
        }
        options
    }
}
