//! Periodic and on-demand refresh.
//!
//! A single `Mutex<()>` is the Idle/Running state. Whoever holds it runs the
//! batch:
//!   - the periodic loop tries to take it and skips the tick when busy;
//!   - a plain on-demand request tries to take it and fails with
//!     `AlreadyRunning` when busy;
//!   - an important on-demand request waits for it and runs right after the
//!     batch in flight.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::updater::{BatchReport, FilterUpdater, RefreshRequest};
use crate::error::{FilterError, FilterResult};

/// First delay after startup.
pub const INITIAL_INTERVAL: Duration = Duration::from_secs(5);
/// Steady-state delay, and the cap while backing off.
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Delay between periodic batches.
///
/// Retries quickly until the first batch gets anything through, then settles
/// on [`MAX_INTERVAL`]. Fully failed batches double the delay up to the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            current: INITIAL_INTERVAL,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn record(&mut self, network_error: bool) {
        self.current = if network_error {
            (self.current * 2).min(MAX_INTERVAL)
        } else {
            MAX_INTERVAL
        };
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RefreshScheduler {
    updater: Arc<FilterUpdater>,
    running: Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(updater: Arc<FilterUpdater>) -> Self {
        Self {
            updater,
            running: Mutex::new(()),
        }
    }

    pub fn updater(&self) -> &Arc<FilterUpdater> {
        &self.updater
    }

    /// Run a batch now, on the caller's task.
    ///
    /// Unless `important` is set this fails fast with `AlreadyRunning` when a
    /// batch is in flight; important requests queue behind it instead.
    pub async fn refresh_now(&self, request: RefreshRequest, important: bool) -> FilterResult<BatchReport> {
        let _running = if important {
            self.running.lock().await
        } else {
            self.running
                .try_lock()
                .map_err(|_| FilterError::AlreadyRunning)?
        };

        Ok(self.updater.refresh(request).await)
    }

    /// One periodic tick; the batch result feeds `backoff`. `None`, with
    /// `backoff` left alone, when scheduled refresh is disabled or a batch is
    /// already running.
    async fn tick(&self, backoff: &mut Backoff) -> Option<BatchReport> {
        if self.updater.update_interval_hours() == 0 {
            return None;
        }
        let report = {
            let _running = self.running.try_lock().ok()?;
            self.updater.refresh(RefreshRequest::all()).await
        };

        backoff.record(report.network_error());
        debug!("Next filter refresh in {:?}", backoff.current());
        Some(report)
    }

    /// The refresh loop. Never returns.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = Backoff::new();
        loop {
            tokio::time::sleep(backoff.current()).await;
            self.tick(&mut backoff).await;
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!("Filter refresh scheduler started");
        tokio::spawn(self.run())
    }
}
