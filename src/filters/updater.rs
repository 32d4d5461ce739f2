//! Filter refresh pipeline.
//!
//! For every due filter:
//!
//!  1. Snapshot `(ID, URL, name, checksum)` under the registry read lock.
//!  2. Without any lock held, open the source and hand it to
//!     `ContentStore::put`, which stages, validates and parses the body, then
//!     either renames it over `<ID>.txt` or drops it and bumps the mtime.
//!  3. Merge the outcomes back under the write lock, matching on ID and URL.
//!
//! A failing filter never aborts the batch. It keeps serving its last
//! committed file while its cached metadata is cleared.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use super::engine::RuleEngine;
use super::fetch::Source;
use super::parser::ParsedFilter;
use super::registry::{FilterRegistry, FilterSnapshot};
use super::store::PutOutcome;
use super::FilterKind;
use crate::error::{FilterError, FilterResult};
use crate::metrics::RefreshMetrics;

/// Which sequences a batch covers and whether staleness is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRequest {
    pub blocklists: bool,
    pub allowlists: bool,
    pub force: bool,
}

impl RefreshRequest {
    /// Both sequences, stale filters only.
    pub const fn all() -> Self {
        Self {
            blocklists: true,
            allowlists: true,
            force: false,
        }
    }

    pub const fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

#[derive(Debug)]
pub enum UpdateOutcome {
    /// New content was committed.
    Changed(ParsedFilter),
    /// Content matched the previous checksum; nothing was written.
    Unchanged,
    /// Fetch, validation, parsing or commit failed.
    Failed(FilterError),
}

/// Result of running the pipeline for one filter.
#[derive(Debug)]
pub struct FilterUpdate {
    pub snapshot: FilterSnapshot,
    pub checked_at: DateTime<Utc>,
    pub outcome: UpdateOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Filters that were due.
    pub candidates: usize,
    pub failed: usize,
    /// Filters whose content actually changed.
    pub updated: usize,
}

impl BatchReport {
    /// Every due filter failed. A batch with nothing due is not a failure.
    pub fn network_error(&self) -> bool {
        self.candidates > 0 && self.failed == self.candidates
    }
}

pub struct FilterUpdater {
    registry: Arc<FilterRegistry>,
    engine: Arc<dyn RuleEngine>,
    client: reqwest::Client,
    metrics: Arc<RefreshMetrics>,
    update_interval_hours: AtomicU32,
    filtering_enabled: AtomicBool,
}

impl FilterUpdater {
    pub fn new(
        registry: Arc<FilterRegistry>,
        engine: Arc<dyn RuleEngine>,
        client: reqwest::Client,
        metrics: Arc<RefreshMetrics>,
    ) -> Self {
        Self {
            registry,
            engine,
            client,
            metrics,
            update_interval_hours: AtomicU32::new(24),
            filtering_enabled: AtomicBool::new(true),
        }
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<RefreshMetrics> {
        &self.metrics
    }

    /// Refresh interval in hours; 0 disables scheduled refresh.
    pub fn update_interval_hours(&self) -> u32 {
        self.update_interval_hours.load(Ordering::Relaxed)
    }

    pub fn set_update_interval_hours(&self, hours: u32) {
        self.update_interval_hours.store(hours, Ordering::Relaxed);
    }

    pub fn filtering_enabled(&self) -> bool {
        self.filtering_enabled.load(Ordering::Relaxed)
    }

    pub fn set_filtering_enabled(&self, enabled: bool) {
        self.filtering_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Run one batch over the due filters of the requested sequences.
    ///
    /// Only reachable through `RefreshScheduler`, which serializes batches.
    pub(crate) async fn refresh(&self, request: RefreshRequest) -> BatchReport {
        debug!("Filters: updating...");

        let now = Utc::now();
        let interval = Duration::hours(i64::from(self.update_interval_hours()));

        let mut candidates = Vec::new();
        if request.blocklists {
            candidates.extend(
                self.registry
                    .due(FilterKind::Blocklist, request.force, interval, now)
                    .await,
            );
        }
        if request.allowlists {
            candidates.extend(
                self.registry
                    .due(FilterKind::Allowlist, request.force, interval, now)
                    .await,
            );
        }

        let mut report = BatchReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            self.metrics.record_batch(&report);
            debug!("Filters: nothing to update");
            return report;
        }

        let mut updates = Vec::with_capacity(candidates.len());
        for snapshot in candidates {
            updates.push(self.update_filter(snapshot).await);
        }

        report.failed = updates
            .iter()
            .filter(|u| matches!(u.outcome, UpdateOutcome::Failed(_)))
            .count();
        report.updated = self.registry.merge(&updates).await;

        self.metrics.record_batch(&report);

        if report.updated > 0 {
            self.enable_filters(true).await;
        }

        debug!(
            "Filters: update finished: {} due, {} updated, {} failed",
            report.candidates, report.updated, report.failed
        );
        report
    }

    /// Run the pipeline for one filter. Never touches the registry.
    async fn update_filter(&self, snapshot: FilterSnapshot) -> FilterUpdate {
        let outcome = match self.ingest(&snapshot).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_fetch_failure() {
                    warn!("Failed to update filter {}: {}", snapshot.url, e);
                } else {
                    error!("Failed to update filter {}: {}", snapshot.url, e);
                }
                UpdateOutcome::Failed(e)
            }
        };

        FilterUpdate {
            snapshot,
            checked_at: Utc::now(),
            outcome,
        }
    }

    async fn ingest(&self, snapshot: &FilterSnapshot) -> FilterResult<UpdateOutcome> {
        trace!("downloading update for filter {} from {}", snapshot.id, snapshot.url);

        let store = self.registry.store();
        let mut source = Source::open(&self.client, &snapshot.url).await?;

        match store.put(snapshot.id, &mut source, snapshot.checksum).await? {
            PutOutcome::Unchanged(_) => {
                trace!("filter #{} from {} has no changes, skip", snapshot.id, snapshot.url);
                Ok(UpdateOutcome::Unchanged)
            }
            PutOutcome::Committed(parsed) => {
                info!(
                    "updated filter {}: {} bytes, {} rules, saved to {}",
                    snapshot.id,
                    parsed.bytes,
                    parsed.rules_count,
                    store.path(snapshot.id).display()
                );
                Ok(UpdateOutcome::Changed(parsed))
            }
        }
    }

    /// Hand the current enabled filters to the rule engine.
    pub async fn enable_filters(&self, apply_async: bool) {
        let set = self.registry.enabled_set().await;
        if let Err(e) = self.engine.set_filters(set, apply_async) {
            debug!("enabling filters: {}", e);
        }
        self.engine.set_enabled(self.filtering_enabled());
    }
}
