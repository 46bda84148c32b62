//! Background health probe.
//!
//! A single tokio task calls `GET /api/health` at a fixed interval and records the result in a
//! shared [`ConnectivityState`].  Starting the probe while it is already running replaces the
//! running task rather than adding a second one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::api::ChatApi;
use crate::observability::{HEALTH_FAILURES, HEALTH_PROBES};
use crate::render::RenderSurface;
use crate::types::Connectivity;

/// Default spacing between probes.
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Shared online/offline flag.
#[derive(Debug, Default)]
pub struct ConnectivityState {
    offline: AtomicBool,
}

impl ConnectivityState {
    /// Create a state that starts online.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reachability.
    pub fn get(&self) -> Connectivity {
        if self.offline.load(Ordering::Acquire) {
            Connectivity::Offline
        } else {
            Connectivity::Online
        }
    }

    /// Record reachability; returns true if it changed.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        let offline = connectivity == Connectivity::Offline;
        self.offline.swap(offline, Ordering::AcqRel) != offline
    }
}

/// Probe once and record the outcome.
pub async fn probe<A: ChatApi + ?Sized>(
    api: &A,
    state: &ConnectivityState,
    surface: &dyn RenderSurface,
) -> Connectivity {
    HEALTH_PROBES.click();
    let connectivity = match api.health().await {
        Ok(()) => Connectivity::Online,
        Err(err) => {
            HEALTH_FAILURES.click();
            tracing::debug!(error = %err, "health probe failed");
            Connectivity::Offline
        }
    };
    if state.set(connectivity) {
        tracing::info!(%connectivity, "connectivity changed");
        surface.connectivity_changed(connectivity);
    }
    connectivity
}

/// Owner of the periodic probe task.
#[derive(Debug)]
pub struct HealthProbe {
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthProbe {
    /// Create a stopped probe that will run every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: Mutex::new(None),
        }
    }

    /// The spacing between probes.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True while a probe task is alive.
    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start probing, replacing any task that is already running.
    ///
    /// The first probe happens one interval after the call.  Must be called from within a tokio
    /// runtime.
    pub fn start<A: ChatApi + 'static>(
        &self,
        api: Arc<A>,
        state: Arc<ConnectivityState>,
        surface: Arc<dyn RenderSurface>,
    ) {
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                probe(api.as_ref(), &state, surface.as_ref()).await;
            }
        });
        if let Some(previous) = self.lock().replace(handle) {
            previous.abort();
            tracing::debug!("restarted health probe");
        }
    }

    /// Stop probing.
    pub fn stop(&self) {
        if let Some(handle) = self.lock().take() {
            handle.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        // A panic while holding this lock cannot leave the handle in a bad state.
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_INTERVAL)
    }
}

impl Drop for HealthProbe {
    fn drop(&mut self) {
        self.stop();
    }
}
