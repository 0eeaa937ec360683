//! Background stale-lock sweeper.
//!
//! Spawns a thread that calls `expire_stale` on a fixed interval. The
//! sweep is idempotent, so overlapping or repeated runs are safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::service::DocumentService;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_secs(1);

/// Handle for the sweeper thread.
///
/// Supports graceful shutdown via `shutdown()` or automatic cleanup on
/// `Drop`.
pub struct LockSweeperHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl LockSweeperHandle {
    /// Request graceful shutdown. An in-progress sweep completes, but no
    /// new sweeps are started.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for LockSweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

/// Start the sweeper on a separate thread. The interval comes from the
/// service's `CoordinatorConfig`.
pub fn start_sweeper(service: Arc<DocumentService>) -> LockSweeperHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    let interval = service.config().lock_sweep_interval;

    let handle = std::thread::spawn(move || {
        tracing::info!(interval_secs = interval.as_secs(), "Lock sweeper started");
        sweeper_loop(&service, interval, &flag);
    });

    LockSweeperHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn sweeper_loop(service: &DocumentService, interval: Duration, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        match service.expire_stale_locks(Utc::now().naive_utc()) {
            Ok(released) if !released.is_empty() => {
                tracing::info!(count = released.len(), "Expired stale locks");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Lock sweep failed"),
        }

        // Sleep in small increments for responsive shutdown
        let mut slept = Duration::ZERO;
        while slept < interval && !shutdown.load(Ordering::Relaxed) {
            std::thread::sleep(SLEEP_GRANULARITY.min(interval - slept));
            slept += SLEEP_GRANULARITY;
        }
    }
    tracing::info!("Lock sweeper stopped");
}
