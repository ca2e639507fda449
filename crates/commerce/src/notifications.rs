//! Outbound buyer notifications.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId};
use domain::Cart;
use tokio::sync::Mutex;

use crate::error::{CommerceError, Result};

/// What an abandoned-cart reminder tells the buyer about their cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartSummary {
    pub lines: Vec<(ProductId, u32)>,
    pub item_count: u32,
    pub total: Money,
}

impl CartSummary {
    pub fn of(cart: &Cart) -> Self {
        Self {
            lines: cart
                .items()
                .iter()
                .map(|item| (item.product_id.clone(), item.quantity))
                .collect(),
            item_count: cart.total_quantity(),
            total: cart.total(),
        }
    }
}

impl fmt::Display for CartSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.item_count == 1 { "item" } else { "items" };
        write!(f, "{} {} totalling {}", self.item_count, noun, self.total)
    }
}

/// Delivery channel for buyer-facing messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Reminds a buyer about the cart they left behind.
    async fn send_abandoned_cart_reminder(
        &self,
        email: &str,
        display_name: &str,
        summary: &CartSummary,
        link: &str,
    ) -> Result<()>;
}

/// Notifier that only writes the message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_abandoned_cart_reminder(
        &self,
        email: &str,
        display_name: &str,
        summary: &CartSummary,
        link: &str,
    ) -> Result<()> {
        tracing::info!(
            %email,
            %display_name,
            %summary,
            %link,
            "Abandoned cart reminder"
        );
        Ok(())
    }
}

/// A reminder captured by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReminder {
    pub email: String,
    pub display_name: String,
    pub summary: CartSummary,
    pub link: String,
}

#[derive(Debug, Default)]
struct Outbox {
    sent: Vec<SentReminder>,
    failing: HashSet<String>,
}

/// Notifier that records messages instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    outbox: Arc<Mutex<Outbox>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every message to `email` fail.
    pub async fn fail_for(&self, email: impl Into<String>) {
        self.outbox.lock().await.failing.insert(email.into());
    }

    pub async fn sent(&self) -> Vec<SentReminder> {
        self.outbox.lock().await.sent.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.outbox.lock().await.sent.len()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send_abandoned_cart_reminder(
        &self,
        email: &str,
        display_name: &str,
        summary: &CartSummary,
        link: &str,
    ) -> Result<()> {
        let mut outbox = self.outbox.lock().await;
        if outbox.failing.contains(email) {
            return Err(CommerceError::Notification(format!(
                "mailbox {email} rejected the message"
            )));
        }
        outbox.sent.push(SentReminder {
            email: email.to_string(),
            display_name: display_name.to_string(),
            summary: summary.clone(),
            link: link.to_string(),
        });
        Ok(())
    }
}
