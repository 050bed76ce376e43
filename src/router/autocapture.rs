//! Auto-capture lifecycle
//!
//! Explicit state for the auto-capture listeners: an enabled flag with
//! start/stop transitions and a throttle that coalesces rapid storage
//! mutation events into at most one capture per window. The state is
//! owned by the router instance for its page context rather than floating
//! in module globals.

use std::time::{Duration, Instant};

use tracing::debug;

/// Default coalescing window between automatic captures.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);

/// Auto-capture listener state for one page context.
#[derive(Debug)]
pub struct AutoCaptureState {
    enabled: bool,
    window: Duration,
    last_capture: Option<Instant>,
}

impl Default for AutoCaptureState {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl AutoCaptureState {
    pub fn new(window: Duration) -> Self {
        Self {
            enabled: false,
            window,
            last_capture: None,
        }
    }

    /// Begin listening for storage mutations. Starting twice is a no-op.
    pub fn start(&mut self) {
        if !self.enabled {
            debug!("auto-capture listeners started");
            self.enabled = true;
        }
    }

    /// Stop listening and forget the throttle state, so a later start
    /// captures the first mutation immediately.
    pub fn stop(&mut self) {
        if self.enabled {
            debug!("auto-capture listeners stopped");
            self.enabled = false;
            self.last_capture = None;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A storage mutation happened; decide whether a capture should fire.
    /// At most one capture per window; events inside the window coalesce
    /// into the capture that opened it.
    pub fn should_capture(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_capture {
            Some(last) if now.duration_since(last) < self.window => false,
            _ => {
                self.last_capture = Some(now);
                true
            }
        }
    }

    /// [`should_capture`](Self::should_capture) against the wall clock.
    pub fn on_mutation(&mut self) -> bool {
        self.should_capture(Instant::now())
    }
}
