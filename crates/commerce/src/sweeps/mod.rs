//! Periodic cleanup jobs over abandoned accounts and carts.
//!
//! Sweeps scan the store, act on each candidate independently and never
//! stop at the first per-item failure. Both are safe to re-run: a second pass
//! over unchanged data does nothing.

mod abandoned_carts;
mod accounts;

pub use abandoned_carts::AbandonedCartSweep;
pub use accounts::UnconfirmedAccountSweep;

use async_trait::async_trait;

use crate::error::Result;

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidates returned by the scan.
    pub scanned: usize,
    /// Candidates acted on.
    pub processed: usize,
    /// Candidates left alone on inspection.
    pub skipped: usize,
    /// Candidates whose action failed.
    pub failed: usize,
}

impl SweepReport {
    pub(crate) fn scanned(count: usize) -> Self {
        Self {
            scanned: count,
            ..Self::default()
        }
    }

    /// Logs the counts and publishes them as metrics.
    pub(crate) fn publish(&self, sweep: &'static str) {
        for (outcome, count) in [
            ("processed", self.processed),
            ("skipped", self.skipped),
            ("failed", self.failed),
        ] {
            metrics::counter!("sweep_items_total", "sweep" => sweep, "outcome" => outcome)
                .increment(count as u64);
        }
        tracing::info!(
            sweep,
            scanned = self.scanned,
            processed = self.processed,
            skipped = self.skipped,
            failed = self.failed,
            "Sweep finished"
        );
    }
}

/// A cleanup job the worker runs on a schedule.
#[async_trait]
pub trait Sweep: Send + Sync {
    /// Stable name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Runs one pass. Fails only if the candidate scan itself fails.
    async fn run(&self) -> Result<SweepReport>;
}
