use std::sync::atomic::{AtomicU64, Ordering};

use crate::filters::updater::BatchReport;

/// Refresh counters shared between the scheduler and on-demand callers.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
    pub batches_total: AtomicU64,
    pub batches_failed: AtomicU64,
    pub filters_updated: AtomicU64,
    pub filters_failed: AtomicU64,
}

impl RefreshMetrics {
    pub fn record_batch(&self, report: &BatchReport) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        if report.network_error() {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.filters_updated
            .fetch_add(report.updated as u64, Ordering::Relaxed);
        self.filters_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
    }

    /// Serialize to Prometheus text exposition format.
    pub fn to_prometheus_text(&self) -> String {
        let batches = self.batches_total.load(Ordering::Relaxed);
        let batches_failed = self.batches_failed.load(Ordering::Relaxed);
        let updated = self.filters_updated.load(Ordering::Relaxed);
        let failed = self.filters_failed.load(Ordering::Relaxed);

        format!(
            "# HELP filter_sync_batches_total Refresh batches run\n\
             # TYPE filter_sync_batches_total counter\n\
             filter_sync_batches_total{{status=\"all\"}} {batches}\n\
             filter_sync_batches_total{{status=\"failed\"}} {batches_failed}\n\
             # HELP filter_sync_filters_total Per-filter refresh results\n\
             # TYPE filter_sync_filters_total counter\n\
             filter_sync_filters_total{{status=\"updated\"}} {updated}\n\
             filter_sync_filters_total{{status=\"failed\"}} {failed}\n"
        )
    }
}
