//! Restore coordinator
//!
//! Delivers stored snapshots into newly loaded private tabs exactly once
//! per (tab, origin) pairing within a navigation lifetime. Runs as a
//! background task owning an in-flight marker table; duplicate load
//! events for a pairing already in flight are skipped, delivery is
//! retried a bounded number of times while the content script comes up,
//! and every attempt re-validates that the tab still exists and still
//! shows the target origin so a stale delivery can never happen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::model::OriginSnapshot;

/// Browser tab identifier.
pub type TabId = u64;

/// Error type for snapshot delivery into a page context.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No receiver in the tab yet (content script not ready); retryable.
    #[error("page not ready to receive")]
    NotReady,

    /// The tab disappeared mid-delivery.
    #[error("tab closed")]
    TabClosed,

    /// Opaque delivery failure.
    #[error("{0}")]
    Failed(String),
}

/// The controller-side view of a tab: probe its origin, push a snapshot
/// into it. Implemented by the browser messaging glue.
#[async_trait]
pub trait RestoreTransport: Send + Sync + 'static {
    /// Current origin of the tab, or `None` when the tab no longer
    /// exists.
    async fn tab_origin(&self, tab: TabId) -> Option<String>;

    /// Deliver a snapshot into the tab's page context.
    async fn deliver(
        &self,
        tab: TabId,
        snapshot: &OriginSnapshot,
        clear_first: bool,
    ) -> Result<(), TransportError>;
}

/// Timing and retry configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delivery attempts per (tab, origin) pairing.
    pub retry_budget: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// In-flight markers older than this are swept as leaked.
    pub marker_staleness: Duration,
    /// How often the staleness sweep runs.
    pub sweep_interval: Duration,
    /// Passed through to the restore call in the page.
    pub clear_first: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry_budget: 3,
            retry_delay: Duration::from_millis(500),
            marker_staleness: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(10),
            clear_first: false,
        }
    }
}

/// Commands to the coordinator task.
#[derive(Debug)]
enum CoordinatorCommand {
    TabReady {
        tab: TabId,
        origin: String,
        snapshot: Box<OriginSnapshot>,
    },
    TabClosed {
        tab: TabId,
    },
    Shutdown,
}

/// Handle to the background coordinator.
#[derive(Clone)]
pub struct RestoreCoordinator {
    cmd_tx: mpsc::UnboundedSender<CoordinatorCommand>,
}

impl RestoreCoordinator {
    /// Spawn the coordinator task over a transport.
    pub fn spawn(config: CoordinatorConfig, transport: Arc<dyn RestoreTransport>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let inner = CoordinatorTask {
            config,
            transport,
            markers: Arc::new(Mutex::new(HashMap::new())),
            cmd_rx,
        };
        tokio::spawn(inner.run());
        Self { cmd_tx }
    }

    /// A private tab reached load-complete on `origin`; schedule delivery
    /// of its stored snapshot.
    pub fn tab_ready(&self, tab: TabId, origin: impl Into<String>, snapshot: OriginSnapshot) {
        let _ = self.cmd_tx.send(CoordinatorCommand::TabReady {
            tab,
            origin: origin.into(),
            snapshot: Box::new(snapshot),
        });
    }

    /// The tab closed; drop its markers without further action.
    pub fn tab_closed(&self, tab: TabId) {
        let _ = self.cmd_tx.send(CoordinatorCommand::TabClosed { tab });
    }

    /// Stop the coordinator task.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(CoordinatorCommand::Shutdown);
    }
}

struct CoordinatorTask {
    config: CoordinatorConfig,
    transport: Arc<dyn RestoreTransport>,
    /// In-flight deliveries: (tab, origin) → when scheduled.
    markers: Arc<Mutex<HashMap<(TabId, String), Instant>>>,
    cmd_rx: mpsc::UnboundedReceiver<CoordinatorCommand>,
}

impl CoordinatorTask {
    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.tick().await; // skip the immediate first tick

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(CoordinatorCommand::TabReady { tab, origin, snapshot }) => {
                            self.schedule(tab, origin, *snapshot);
                        }
                        Some(CoordinatorCommand::TabClosed { tab }) => {
                            self.markers.lock().retain(|(t, _), _| *t != tab);
                        }
                        Some(CoordinatorCommand::Shutdown) | None => break,
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_stale_markers();
                }
            }
        }
    }

    fn schedule(&self, tab: TabId, origin: String, snapshot: OriginSnapshot) {
        let key = (tab, origin);
        {
            let mut markers = self.markers.lock();
            if markers.contains_key(&key) {
                debug!(tab, origin = %key.1, "restore already in flight, skipping duplicate");
                return;
            }
            markers.insert(key.clone(), Instant::now());
        }

        let transport = Arc::clone(&self.transport);
        let markers = Arc::clone(&self.markers);
        let config = self.config.clone();
        tokio::spawn(async move {
            deliver_with_retries(transport, &key, &snapshot, &config).await;
            // Terminal outcome of any kind clears the marker.
            markers.lock().remove(&key);
        });
    }

    /// Safety net against markers leaked by crashed or unresponsive tabs.
    fn sweep_stale_markers(&self) {
        let staleness = self.config.marker_staleness;
        let now = Instant::now();
        let mut markers = self.markers.lock();
        let before = markers.len();
        markers.retain(|_, scheduled| now.duration_since(*scheduled) < staleness);
        let swept = before - markers.len();
        if swept > 0 {
            warn!(swept, "swept stale in-flight restore markers");
        }
    }
}

async fn deliver_with_retries(
    transport: Arc<dyn RestoreTransport>,
    key: &(TabId, String),
    snapshot: &OriginSnapshot,
    config: &CoordinatorConfig,
) {
    let (tab, origin) = (key.0, key.1.as_str());

    for attempt in 1..=config.retry_budget {
        // Re-validate before every attempt: abort immediately, without
        // consuming retries, if the tab is gone or navigated elsewhere.
        match transport.tab_origin(tab).await {
            None => {
                debug!(tab, origin, "tab gone before delivery, dropping restore");
                return;
            }
            Some(current) if current != origin => {
                debug!(
                    tab,
                    origin,
                    current = %current,
                    "tab navigated away, aborting stale restore"
                );
                return;
            }
            Some(_) => {}
        }

        match transport.deliver(tab, snapshot, config.clear_first).await {
            Ok(()) => {
                debug!(tab, origin, attempt, "snapshot delivered");
                return;
            }
            Err(TransportError::TabClosed) => {
                debug!(tab, origin, "tab closed mid-delivery");
                return;
            }
            Err(err) => {
                if attempt == config.retry_budget {
                    // Exhaustion is logged, never surfaced to the user.
                    warn!(tab, origin, error = %err, "restore retries exhausted");
                } else {
                    debug!(tab, origin, attempt, error = %err, "delivery failed, will retry");
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }
}
