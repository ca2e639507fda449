use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use common::{Clock, SystemClock};
use domain::Cart;
use store::Store;

use crate::error::Result;
use crate::notifications::{CartSummary, Notifier};
use crate::retry::RetryPolicy;
use crate::sweeps::{Sweep, SweepReport};

enum Outcome {
    Sent,
    Skipped(&'static str),
}

/// Reminds registered buyers about carts they stopped touching.
///
/// The cart itself is never modified. Each reminder is recorded against the
/// cart's `updated_at`, so a buyer hears about a given cart state once and
/// becomes eligible again only after further activity.
pub struct AbandonedCartSweep<S: Store, N: Notifier> {
    store: S,
    notifier: N,
    clock: Arc<dyn Clock>,
    threshold: Duration,
    storefront_url: String,
    retry: RetryPolicy,
}

impl<S: Store, N: Notifier> AbandonedCartSweep<S, N> {
    pub fn new(
        store: S,
        notifier: N,
        threshold: Duration,
        storefront_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(SystemClock),
            threshold,
            storefront_url: storefront_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn cart_link(&self) -> String {
        format!("{}/cart", self.storefront_url)
    }

    async fn remind(&self, cart: &Cart) -> Result<Outcome> {
        let Some(user_id) = cart.user_id() else {
            return Ok(Outcome::Skipped("anonymous"));
        };

        let reminded = self
            .retry
            .run("last_reminder", || self.store.last_reminder(cart.id()))
            .await?;
        if reminded.is_some_and(|at| at >= cart.updated_at()) {
            return Ok(Outcome::Skipped("already reminded"));
        }

        let account = self
            .retry
            .run("get_account", || self.store.get_account(user_id))
            .await?;
        let Some(account) = account else {
            return Ok(Outcome::Skipped("owner gone"));
        };
        if !account.email_confirmed {
            return Ok(Outcome::Skipped("email unconfirmed"));
        }

        self.notifier
            .send_abandoned_cart_reminder(
                &account.email,
                &account.display_name,
                &CartSummary::of(cart),
                &self.cart_link(),
            )
            .await?;

        self.store
            .record_reminder(cart.id(), cart.updated_at(), self.clock.now())
            .await?;
        Ok(Outcome::Sent)
    }
}

#[async_trait]
impl<S: Store, N: Notifier> Sweep for AbandonedCartSweep<S, N> {
    fn name(&self) -> &'static str {
        "abandoned_carts"
    }

    #[tracing::instrument(skip(self))]
    async fn run(&self) -> Result<SweepReport> {
        let cutoff = self.clock.now() - self.threshold;
        let carts = self
            .retry
            .run("find_abandoned_carts", || self.store.find_abandoned_carts(cutoff))
            .await?;

        let mut report = SweepReport::scanned(carts.len());
        for cart in &carts {
            match self.remind(cart).await {
                Ok(Outcome::Sent) => {
                    report.processed += 1;
                    tracing::debug!(cart_id = %cart.id(), "Sent abandoned cart reminder");
                }
                Ok(Outcome::Skipped(reason)) => {
                    report.skipped += 1;
                    tracing::debug!(cart_id = %cart.id(), reason, "Skipped abandoned cart");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(cart_id = %cart.id(), error = %e, "Failed to send abandoned cart reminder");
                }
            }
        }

        report.publish(self.name());
        Ok(report)
    }
}
