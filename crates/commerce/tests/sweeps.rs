//! Cleanup sweeps driven by a manual clock.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use commerce::{
    AbandonedCartSweep, CartService, InMemoryNotifier, RetryPolicy, Sweep, SweepReport,
    UnconfirmedAccountSweep,
};
use common::{BuyerKey, Clock, ManualClock, Money, UserId};
use domain::{Account, AccountPolicy, Product};
use store::{AccountStore, InMemoryStore, InventoryStore};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, StdDuration::from_millis(1))
}

struct Shop {
    store: InMemoryStore,
    clock: Arc<ManualClock>,
    notifier: InMemoryNotifier,
}

impl Shop {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        store
            .upsert_product(Product::new("SKU-001", "Widget", Money::from_cents(1200)).with_stock(20))
            .await
            .unwrap();
        Self {
            store,
            clock: Arc::new(ManualClock::new(Utc::now())),
            notifier: InMemoryNotifier::new(),
        }
    }

    async fn account(&self, email: &str, confirmed: bool) -> UserId {
        let mut account = Account::register(email, "Sam", self.clock.now());
        account.email_confirmed = confirmed;
        let id = account.id;
        self.store.insert_account(account).await.unwrap();
        id
    }

    async fn cart_for(&self, user: Option<UserId>, quantity: u32) -> BuyerKey {
        let carts = CartService::with_clock(self.store.clone(), self.clock.clone());
        let key = BuyerKey::generate();
        let cart = carts.find_or_create(&key, user).await.unwrap();
        carts.add_item(cart.id(), &"SKU-001".into(), quantity).await.unwrap();
        key
    }

    fn cart_sweep(&self) -> AbandonedCartSweep<InMemoryStore, InMemoryNotifier> {
        AbandonedCartSweep::new(
            self.store.clone(),
            self.notifier.clone(),
            Duration::days(3),
            "https://shop.example.com/",
        )
        .with_clock(self.clock.clone())
        .with_retry(fast_retry())
    }

    fn account_sweep(&self) -> UnconfirmedAccountSweep<InMemoryStore> {
        UnconfirmedAccountSweep::with_clock(
            self.store.clone(),
            AccountPolicy::default(),
            self.clock.clone(),
        )
        .with_retry(fast_retry())
    }
}

#[tokio::test]
async fn abandoned_cart_is_reminded_once() {
    let shop = Shop::new().await;
    let user = shop.account("sam@example.com", true).await;
    shop.cart_for(Some(user), 2).await;

    shop.clock.advance(Duration::days(4));
    let sweep = shop.cart_sweep();
    let first = sweep.run().await.unwrap();
    let second = sweep.run().await.unwrap();

    assert_eq!(first.processed, 1);
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 1);

    let sent = shop.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, "sam@example.com");
    assert_eq!(sent[0].link, "https://shop.example.com/cart");
    assert_eq!(sent[0].summary.item_count, 2);
    assert_eq!(sent[0].summary.total.cents(), 2400);
}

#[tokio::test]
async fn activity_after_reminder_makes_cart_eligible_again() {
    let shop = Shop::new().await;
    let user = shop.account("sam@example.com", true).await;
    let key = shop.cart_for(Some(user), 1).await;

    shop.clock.advance(Duration::days(4));
    shop.cart_sweep().run().await.unwrap();

    let carts = CartService::with_clock(shop.store.clone(), shop.clock.clone());
    let cart = carts.find_or_create(&key, Some(user)).await.unwrap();
    carts.add_item(cart.id(), &"SKU-001".into(), 1).await.unwrap();

    shop.clock.advance(Duration::days(1));
    assert_eq!(shop.cart_sweep().run().await.unwrap().processed, 0);

    shop.clock.advance(Duration::days(3));
    assert_eq!(shop.cart_sweep().run().await.unwrap().processed, 1);
    assert_eq!(shop.notifier.sent_count().await, 2);
}

#[tokio::test]
async fn recent_anonymous_and_unconfirmed_carts_are_left_alone() {
    let shop = Shop::new().await;
    let confirmed = shop.account("sam@example.com", true).await;
    let unconfirmed = shop.account("new@example.com", false).await;
    shop.cart_for(None, 1).await;
    shop.cart_for(Some(unconfirmed), 1).await;

    shop.clock.advance(Duration::days(4));
    shop.cart_for(Some(confirmed), 1).await;

    let report = shop.cart_sweep().run().await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            scanned: 2,
            processed: 0,
            skipped: 2,
            failed: 0,
        }
    );
    assert_eq!(shop.notifier.sent_count().await, 0);
}

#[tokio::test]
async fn failed_delivery_is_retried_next_run() {
    let shop = Shop::new().await;
    let bouncing = shop.account("bounce@example.com", true).await;
    let fine = shop.account("fine@example.com", true).await;
    shop.cart_for(Some(bouncing), 1).await;
    shop.cart_for(Some(fine), 1).await;
    shop.notifier.fail_for("bounce@example.com").await;

    shop.clock.advance(Duration::days(4));
    let report = shop.cart_sweep().run().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(shop.notifier.sent().await[0].email, "fine@example.com");
}

#[tokio::test]
async fn scan_recovers_from_transient_failures() {
    let shop = Shop::new().await;
    let user = shop.account("sam@example.com", true).await;
    shop.cart_for(Some(user), 1).await;
    shop.store.fail_next_reads(2);

    shop.clock.advance(Duration::days(4));
    let report = shop.cart_sweep().run().await.unwrap();

    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn expired_unconfirmed_accounts_are_deleted() {
    let shop = Shop::new().await;
    let stale = shop.account("stale@example.com", false).await;
    let confirmed = shop.account("old@example.com", true).await;
    shop.clock.advance(Duration::hours(23));
    let fresh = shop.account("fresh@example.com", false).await;

    shop.clock.advance(Duration::hours(2));
    let sweep = shop.account_sweep();
    let report = sweep.run().await.unwrap();

    assert_eq!(report.processed, 1);
    assert!(shop.store.get_account(stale).await.unwrap().is_none());
    assert!(shop.store.get_account(confirmed).await.unwrap().is_some());
    assert!(shop.store.get_account(fresh).await.unwrap().is_some());

    assert_eq!(sweep.run().await.unwrap(), SweepReport::default());
}

#[tokio::test]
async fn account_confirmed_during_sweep_survives() {
    let shop = Shop::new().await;
    let user = shop.account("late@example.com", false).await;
    shop.clock.advance(Duration::hours(30));

    // Confirmation lands between the scan and the delete.
    let cutoff = AccountPolicy::default().cutoff(shop.clock.now());
    let scanned = shop.store.find_unconfirmed_accounts(cutoff).await.unwrap();
    assert_eq!(scanned.len(), 1);
    shop.store.confirm_email(user).await.unwrap();

    assert!(!shop.store.delete_unconfirmed_account(user, cutoff).await.unwrap());
    let report = shop.account_sweep().run().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert!(shop.store.get_account(user).await.unwrap().is_some());
}

#[tokio::test]
async fn failing_delete_does_not_stop_the_sweep() {
    let shop = Shop::new().await;
    let stuck = shop.account("stuck@example.com", false).await;
    let other = shop.account("other@example.com", false).await;
    shop.store.fail_account_delete(stuck);

    shop.clock.advance(Duration::hours(25));
    let report = shop.account_sweep().run().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 1);
    assert!(shop.store.get_account(other).await.unwrap().is_none());
    assert!(shop.store.get_account(stuck).await.unwrap().is_some());
}
