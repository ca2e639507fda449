use std::sync::Arc;

use async_trait::async_trait;
use common::{Clock, SystemClock};
use domain::AccountPolicy;
use store::Store;

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::sweeps::{Sweep, SweepReport};

/// Deletes accounts that never confirmed their email within the grace window.
pub struct UnconfirmedAccountSweep<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    policy: AccountPolicy,
    retry: RetryPolicy,
}

impl<S: Store> UnconfirmedAccountSweep<S> {
    pub fn new(store: S, policy: AccountPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, policy: AccountPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl<S: Store> Sweep for UnconfirmedAccountSweep<S> {
    fn name(&self) -> &'static str {
        "unconfirmed_accounts"
    }

    #[tracing::instrument(skip(self))]
    async fn run(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let cutoff = self.policy.cutoff(now);
        let candidates = self
            .retry
            .run("find_unconfirmed_accounts", || {
                self.store.find_unconfirmed_accounts(cutoff)
            })
            .await?;

        let mut report = SweepReport::scanned(candidates.len());
        for account in candidates {
            if !self.policy.is_expired(&account, now) {
                report.skipped += 1;
                continue;
            }

            // The delete re-checks both conditions, so an account confirmed
            // since the scan is left alone.
            match self
                .store
                .delete_unconfirmed_account(account.id, cutoff)
                .await
            {
                Ok(true) => {
                    report.processed += 1;
                    tracing::debug!(user_id = %account.id, "Deleted unconfirmed account");
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(user_id = %account.id, error = %e, "Failed to delete unconfirmed account");
                }
            }
        }

        report.publish(self.name());
        Ok(report)
    }
}
