//! Server lifecycle state and in-flight request tracking.
//!
//! The state lives in a `watch` channel so readiness probes read it without
//! locking and shutdown listeners can await the transition to `Draining`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle: Starting -> Ready -> Draining -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Starting,
    Ready,
    /// No new tenant requests are admitted; in-flight ones finish.
    Draining,
    Stopped,
}

/// Coordinates graceful shutdown.
#[derive(Debug)]
pub struct ShutdownController {
    state: watch::Sender<HealthState>,
    in_flight: Arc<AtomicU64>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(HealthState::Starting);
        Self {
            state,
            in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_ready(&self) {
        self.state.send_replace(HealthState::Ready);
    }

    /// Moves to `Draining` and wakes every [`wait_for_shutdown`](Self::wait_for_shutdown) caller.
    pub fn trigger_shutdown(&self) {
        self.state.send_if_modified(|state| match state {
            HealthState::Starting | HealthState::Ready => {
                *state = HealthState::Draining;
                true
            }
            HealthState::Draining | HealthState::Stopped => false,
        });
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        *self.state.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|s| matches!(s, HealthState::Draining | HealthState::Stopped))
            .await;
    }

    /// Counts a request as in flight until the guard drops.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits up to `timeout` for in-flight requests to finish.
    ///
    /// Returns `true` and moves to `Stopped` when they did; on timeout the
    /// state stays `Draining`.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.state.send_replace(HealthState::Stopped);
        true
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight counter on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
