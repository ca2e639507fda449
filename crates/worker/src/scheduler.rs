//! Periodic execution of sweeps.

use std::sync::Arc;
use std::time::Duration;

use commerce::Sweep;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Runs each registered sweep on its own interval until cancelled.
///
/// Sweeps never overlap with themselves: a run that outlasts its period
/// delays the next tick instead of stacking up.
#[derive(Default)]
pub struct Scheduler {
    jobs: Vec<(Arc<dyn Sweep>, Duration)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sweep` to run every `period`, starting immediately.
    pub fn every(mut self, period: Duration, sweep: impl Sweep + 'static) -> Self {
        self.jobs.push((Arc::new(sweep), period));
        self
    }

    /// Names of the registered sweeps, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|(sweep, _)| sweep.name()).collect()
    }

    /// Spawns one task per sweep. Each stops once `shutdown` is cancelled.
    pub fn start(self, shutdown: CancellationToken) -> JoinSet<()> {
        let mut tasks = JoinSet::new();
        for (sweep, period) in self.jobs {
            tasks.spawn(run_every(sweep, period, shutdown.clone()));
        }
        tasks
    }
}

async fn run_every(sweep: Arc<dyn Sweep>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(sweep = sweep.name(), period_secs = period.as_secs(), "Sweep scheduled");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A sweep in progress finishes its pass before shutdown is observed.
        if let Err(e) = sweep.run().await {
            tracing::error!(sweep = sweep.name(), error = %e, "Sweep run failed");
        }
    }

    tracing::info!(sweep = sweep.name(), "Sweep stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use commerce::{CommerceError, Result, SweepReport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSweep {
        runs: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Sweep for CountingSweep {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(&self) -> Result<SweepReport> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CommerceError::Notification("boom".into()));
            }
            Ok(SweepReport::default())
        }
    }

    #[tokio::test]
    async fn test_runs_repeatedly_until_cancelled() {
        let runs = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let mut tasks = Scheduler::new()
            .every(
                Duration::from_millis(10),
                CountingSweep {
                    runs: runs.clone(),
                    fail: false,
                },
            )
            .start(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(55)).await;
        shutdown.cancel();
        while tasks.join_next().await.is_some() {}

        let seen = runs.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several runs, saw {seen}");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_failing_sweep_keeps_its_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let mut tasks = Scheduler::new()
            .every(
                Duration::from_millis(10),
                CountingSweep {
                    runs: runs.clone(),
                    fail: true,
                },
            )
            .start(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(45)).await;
        shutdown.cancel();
        while tasks.join_next().await.is_some() {}

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
