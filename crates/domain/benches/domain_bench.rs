use std::collections::HashMap;

use chrono::Utc;
use common::{BuyerKey, Money, Percent, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Cart, OrderItem, Product, ReconciliationPlan, Totals};

fn catalog(size: usize) -> Vec<Product> {
    (0..size)
        .map(|i| {
            Product::new(
                format!("SKU-{i:04}"),
                format!("Product {i}"),
                Money::from_cents(100 + i as i64),
            )
            .with_stock(1_000)
            .with_discount(Percent::new((i % 50) as u8).unwrap())
        })
        .collect()
}

fn filled_cart(products: &[Product]) -> Cart {
    let mut cart = Cart::new(BuyerKey::generate(), None, Utc::now());
    for product in products {
        cart.add_item(product, 3, Utc::now()).unwrap();
    }
    cart
}

fn bench_add_item(c: &mut Criterion) {
    let products = catalog(50);

    c.bench_function("domain/cart_add_50_items", |b| {
        b.iter(|| filled_cart(&products));
    });
}

fn bench_refresh_pricing(c: &mut Criterion) {
    let products = catalog(100);
    let mut cart = filled_cart(&products);
    let by_id: HashMap<ProductId, Product> =
        products.into_iter().map(|p| (p.id.clone(), p)).collect();

    c.bench_function("domain/cart_refresh_pricing_100", |b| {
        b.iter(|| cart.refresh_pricing(&by_id));
    });
}

fn bench_reconciliation_plan(c: &mut Criterion) {
    let products = catalog(100);
    let cart = filled_cart(&products);
    let stock: HashMap<ProductId, u32> = products
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.clone(), (i % 5) as u32))
        .collect();

    c.bench_function("domain/reconciliation_plan_100", |b| {
        b.iter(|| ReconciliationPlan::for_cart(&cart, &stock));
    });
}

fn bench_order_totals(c: &mut Criterion) {
    let items: Vec<OrderItem> = catalog(100)
        .iter()
        .map(|p| OrderItem::snapshot(p, 2))
        .collect();

    c.bench_function("domain/order_totals_100", |b| {
        b.iter(|| Totals::of(&items));
    });
}

criterion_group!(
    benches,
    bench_add_item,
    bench_refresh_pricing,
    bench_reconciliation_plan,
    bench_order_totals,
);
criterion_main!(benches);
