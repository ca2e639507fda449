use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BuyerKey, CartId, Money, OrderId, Percent, ProductId, UserId, Version};
use domain::{
    Account, Cart, CartItem, CartParts, Order, OrderCode, OrderItem, OrderParts, OrderStatus,
    Product, StatusChange,
};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{AccountStore, CartStore, CheckoutCommit, InventoryStore, OrderStore, ReminderStore},
};

const PRODUCT_COLUMNS: &str =
    "id, title, description, image, price_cents, discount, stock, available";
const CART_COLUMNS: &str = "id, buyer_key, user_id, version, created_at, updated_at";
const ORDER_COLUMNS: &str =
    "id, code, user_id, status, subtotal_cents, total_cents, version, created_at, updated_at";
const ACCOUNT_COLUMNS: &str = "id, email, display_name, email_confirmed, created_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("Running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn load_carts(&self, rows: Vec<PgRow>) -> Result<Vec<Cart>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT cart_id, product_id, quantity, unit_price_cents, discount
            FROM cart_items
            WHERE cart_id = ANY($1)
            ORDER BY cart_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<CartItem>> = HashMap::new();
        for row in item_rows {
            let cart_id: Uuid = row.try_get("cart_id")?;
            items.entry(cart_id).or_default().push(row_to_cart_item(&row)?);
        }

        rows.into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                row_to_cart(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn load_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents, title, description, image, discount
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id: Uuid = row.try_get("order_id")?;
            items
                .entry(order_id)
                .or_default()
                .push(row_to_order_item(&row)?);
        }

        rows.into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                row_to_order(row, items.remove(&id).unwrap_or_default())
            })
            .collect()
    }
}

// Row mapping

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn to_percent(value: i16) -> Result<Percent> {
    u8::try_from(value)
        .ok()
        .and_then(|v| Percent::new(v).ok())
        .ok_or_else(|| StoreError::Corrupt(format!("discount out of range: {value}")))
}

fn to_status(value: &str) -> Result<OrderStatus> {
    value
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{e}")))
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::new(row.try_get::<String, _>("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        discount: to_percent(row.try_get("discount")?)?,
        stock: to_u32(row.try_get("stock")?, "stock")?,
        available: row.try_get("available")?,
    })
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
    Ok(CartItem {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        discount: to_percent(row.try_get("discount")?)?,
    })
}

fn row_to_cart(row: PgRow, items: Vec<CartItem>) -> Result<Cart> {
    Ok(Cart::rehydrate(CartParts {
        id: CartId::from_uuid(row.try_get("id")?),
        buyer_key: BuyerKey::new(row.try_get::<String, _>("buyer_key")?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")?
            .map(UserId::from_uuid),
        items,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    }))
}

fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        image: row.try_get("image")?,
        discount: to_percent(row.try_get("discount")?)?,
    })
}

fn row_to_order(row: PgRow, items: Vec<OrderItem>) -> Result<Order> {
    Ok(Order::rehydrate(OrderParts {
        id: OrderId::from_uuid(row.try_get("id")?),
        code: OrderCode::new(row.try_get::<String, _>("code")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        status: to_status(row.try_get("status")?)?,
        items,
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        total: Money::from_cents(row.try_get("total_cents")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: Version::new(row.try_get("version")?),
    }))
}

fn row_to_status_change(row: &PgRow) -> Result<StatusChange> {
    Ok(StatusChange {
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        actor_id: UserId::from_uuid(row.try_get("actor_id")?),
        from: to_status(row.try_get("from_status")?)?,
        to: to_status(row.try_get("to_status")?)?,
        changed_at: row.try_get("changed_at")?,
    })
}

fn row_to_account(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        email_confirmed: row.try_get("email_confirmed")?,
        created_at: row.try_get("created_at")?,
    })
}

// Transaction steps

/// Maps a unique-constraint violation on a cart row to `UniqueViolation`.
fn map_cart_unique(err: sqlx::Error, cart: &Cart) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.constraint() {
            Some("unique_cart_buyer_key") => {
                return StoreError::UniqueViolation {
                    entity: "cart",
                    field: "buyer_key",
                    value: cart.buyer_key().to_string(),
                };
            }
            Some("unique_cart_user") => {
                return StoreError::UniqueViolation {
                    entity: "cart",
                    field: "user_id",
                    value: cart.user_id().map(|id| id.to_string()).unwrap_or_default(),
                };
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

async fn current_cart_version(conn: &mut PgConnection, cart_id: CartId) -> Result<Version> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM carts WHERE id = $1")
        .bind(cart_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(version.map_or(Version::initial(), Version::new))
}

async fn save_cart_in(conn: &mut PgConnection, cart: &Cart) -> Result<Version> {
    let expected = cart.version();
    let version = expected.next();

    if expected == Version::initial() {
        sqlx::query(
            r#"
            INSERT INTO carts (id, buyer_key, user_id, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.buyer_key().as_str())
        .bind(cart.user_id().map(|id| id.as_uuid()))
        .bind(version.as_i64())
        .bind(cart.created_at())
        .bind(cart.updated_at())
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            // A primary key clash means someone inserted this cart first
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("carts_pkey")
            {
                return StoreError::conflict("cart", cart.id(), expected, Version::first());
            }
            map_cart_unique(e, cart)
        })?;
    } else {
        let updated = sqlx::query(
            r#"
            UPDATE carts
            SET buyer_key = $2, user_id = $3, updated_at = $4, version = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(cart.buyer_key().as_str())
        .bind(cart.user_id().map(|id| id.as_uuid()))
        .bind(cart.updated_at())
        .bind(version.as_i64())
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await
        .map_err(|e| map_cart_unique(e, cart))?;

        if updated.rows_affected() == 0 {
            let actual = current_cart_version(conn, cart.id()).await?;
            return Err(StoreError::conflict("cart", cart.id(), expected, actual));
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id().as_uuid())
            .execute(&mut *conn)
            .await?;
    }

    for (position, item) in cart.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO cart_items (cart_id, position, product_id, quantity, unit_price_cents, discount)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(cart.id().as_uuid())
        .bind(position as i32)
        .bind(item.product_id.as_str())
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.cents())
        .bind(i16::from(item.discount.value()))
        .execute(&mut *conn)
        .await?;
    }

    Ok(version)
}

async fn delete_cart_in(conn: &mut PgConnection, cart_id: CartId, expected: Version) -> Result<()> {
    let deleted = sqlx::query("DELETE FROM carts WHERE id = $1 AND version = $2")
        .bind(cart_id.as_uuid())
        .bind(expected.as_i64())
        .execute(&mut *conn)
        .await?;

    if deleted.rows_affected() == 0 {
        let actual = current_cart_version(conn, cart_id).await?;
        return Err(StoreError::conflict("cart", cart_id, expected, actual));
    }
    Ok(())
}

async fn decrement_stock_in(
    conn: &mut PgConnection,
    product_id: &ProductId,
    quantity: u32,
) -> Result<Option<u32>> {
    let remaining: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE products
        SET stock = stock - $2
        WHERE id = $1 AND available AND stock >= $2
        RETURNING stock
        "#,
    )
    .bind(product_id.as_str())
    .bind(i64::from(quantity))
    .fetch_optional(&mut *conn)
    .await?;

    remaining.map(|stock| to_u32(stock, "stock")).transpose()
}

/// Builds the `InsufficientStock` error for a failed conditional decrement.
async fn insufficient_stock(
    conn: &mut PgConnection,
    product_id: &ProductId,
    requested: u32,
) -> Result<StoreError> {
    let row = sqlx::query("SELECT stock, available FROM products WHERE id = $1")
        .bind(product_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    let available = match row {
        Some(row) if row.try_get::<bool, _>("available")? => {
            to_u32(row.try_get("stock")?, "stock")?
        }
        _ => 0,
    };

    Ok(StoreError::InsufficientStock {
        product_id: product_id.clone(),
        requested,
        available,
    })
}

async fn insert_order_in(conn: &mut PgConnection, order: &Order, version: Version) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, code, user_id, status, subtotal_cents, total_cents, version, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(order.id().as_uuid())
    .bind(order.code().as_str())
    .bind(order.user_id().as_uuid())
    .bind(order.status().as_str())
    .bind(order.subtotal().cents())
    .bind(order.total().cents())
    .bind(version.as_i64())
    .bind(order.created_at())
    .bind(order.updated_at())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some("unique_order_code")
        {
            return StoreError::UniqueViolation {
                entity: "order",
                field: "code",
                value: order.code().to_string(),
            };
        }
        StoreError::Database(e)
    })?;

    for (position, item) in order.items().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO order_items
                (order_id, position, product_id, quantity, unit_price_cents, title, description, image, discount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(position as i32)
        .bind(item.product_id.as_str())
        .bind(i64::from(item.quantity))
        .bind(item.unit_price.cents())
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.image.as_deref())
        .bind(i16::from(item.discount.value()))
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn get_products(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let ids: Vec<&str> = product_ids.iter().map(ProductId::as_str).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row_to_product(row).map(|p| (p.id.clone(), p)))
            .collect()
    }

    async fn upsert_product(&self, product: Product) -> Result<()> {
        product.validate()?;

        sqlx::query(
            r#"
            INSERT INTO products (id, title, description, image, price_cents, discount, stock, available)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                image = EXCLUDED.image,
                price_cents = EXCLUDED.price_cents,
                discount = EXCLUDED.discount,
                stock = EXCLUDED.stock,
                available = EXCLUDED.available
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.image.as_deref())
        .bind(product.price.cents())
        .bind(i16::from(product.discount.value()))
        .bind(i64::from(product.stock))
        .bind(product.available)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn decrement_stock(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        match decrement_stock_in(&mut conn, product_id, quantity).await? {
            Some(remaining) => Ok(remaining),
            None => {
                let exists: Option<String> =
                    sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
                        .bind(product_id.as_str())
                        .fetch_optional(&mut *conn)
                        .await?;
                if exists.is_none() {
                    return Err(StoreError::not_found("product", product_id));
                }
                Err(insufficient_stock(&mut conn, product_id, quantity).await?)
            }
        }
    }

    async fn increment_stock(&self, product_id: &ProductId, quantity: u32) -> Result<u32> {
        let stock: Option<i64> = sqlx::query_scalar(
            "UPDATE products SET stock = LEAST(stock + $2, 4294967295) WHERE id = $1 RETURNING stock",
        )
        .bind(product_id.as_str())
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await?;

        let stock = stock.ok_or_else(|| StoreError::not_found("product", product_id))?;
        to_u32(stock, "stock")
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        let rows = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(cart_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.load_carts(rows).await?.pop())
    }

    async fn get_cart_by_buyer_key(&self, buyer_key: &BuyerKey) -> Result<Option<Cart>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE buyer_key = $1"
        ))
        .bind(buyer_key.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.load_carts(rows).await?.pop())
    }

    async fn get_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let rows = sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"))
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.load_carts(rows).await?.pop())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = save_cart_in(&mut tx, cart).await?;
        tx.commit().await?;
        Ok(version)
    }

    async fn delete_cart(&self, cart_id: CartId, expected: Version) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        delete_cart_in(&mut conn, cart_id, expected).await
    }

    async fn merge_carts(&self, survivor: &Cart, discarded: &Cart) -> Result<Version> {
        let mut tx = self.pool.begin().await?;

        // The discarded cart goes first: the survivor may take over its buyer key
        delete_cart_in(&mut tx, discarded.id(), discarded.version()).await?;
        let version = save_cart_in(&mut tx, survivor).await?;

        tx.commit().await?;
        Ok(version)
    }

    async fn find_abandoned_carts(&self, updated_before: DateTime<Utc>) -> Result<Vec<Cart>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CART_COLUMNS}
            FROM carts c
            WHERE c.updated_at < $1
              AND EXISTS (SELECT 1 FROM cart_items i WHERE i.cart_id = c.id)
            ORDER BY c.updated_at ASC
            "#
        ))
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?;

        self.load_carts(rows).await
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    #[tracing::instrument(skip(self, commit), fields(cart_id = %commit.cart_id, order_id = %commit.order.id()))]
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        // Lock the source cart so a concurrent edit waits for this checkout
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT version FROM carts WHERE id = $1 FOR UPDATE")
                .bind(commit.cart_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let actual = locked.map_or(Version::initial(), Version::new);
        if locked.is_none() || actual != commit.cart_version {
            return Err(StoreError::conflict(
                "cart",
                commit.cart_id,
                commit.cart_version,
                actual,
            ));
        }

        let mut order = commit.order.clone();
        order.set_version(Version::first());
        insert_order_in(&mut tx, &order, Version::first()).await?;

        // Stable lock order across concurrent checkouts
        let mut decrements: Vec<_> = commit.decrements().collect();
        decrements.sort_by(|a, b| a.0.cmp(b.0));
        for (product_id, quantity) in decrements {
            if decrement_stock_in(&mut tx, product_id, quantity)
                .await?
                .is_none()
            {
                tracing::debug!(%product_id, quantity, "Conditional stock decrement matched no row");
                return Err(insufficient_stock(&mut tx, product_id, quantity).await?);
            }
        }

        delete_cart_in(&mut tx, commit.cart_id, commit.cart_version).await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.load_orders(rows).await?.pop())
    }

    async fn get_order_by_code(&self, code: &OrderCode) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE code = $1"))
            .bind(code.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.load_orders(rows).await?.pop())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.load_orders(rows).await
    }

    async fn record_status_change(
        &self,
        change: &StatusChange,
        expected: Version,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await?;
        let version = expected.next();

        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3, version = $4
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(change.order_id.as_uuid())
        .bind(change.to.as_str())
        .bind(change.changed_at)
        .bind(version.as_i64())
        .bind(expected.as_i64())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                    .bind(change.order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match actual {
                Some(actual) => {
                    StoreError::conflict("order", change.order_id, expected, Version::new(actual))
                }
                None => StoreError::not_found("order", change.order_id),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO order_status_changes (order_id, actor_id, from_status, to_status, changed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(change.order_id.as_uuid())
        .bind(change.actor_id.as_uuid())
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.changed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(version)
    }

    async fn status_history(&self, order_id: OrderId) -> Result<Vec<StatusChange>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, actor_id, from_status, to_status, changed_at
            FROM order_status_changes
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_status_change).collect()
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn insert_account(&self, account: Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, display_name, email_confirmed, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.email_confirmed)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_account_email")
            {
                return StoreError::UniqueViolation {
                    entity: "account",
                    field: "email",
                    value: account.email.clone(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn confirm_email(&self, user_id: UserId) -> Result<bool> {
        let updated = sqlx::query("UPDATE accounts SET email_confirmed = TRUE WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(updated.rows_affected() > 0)
    }

    async fn find_unconfirmed_accounts(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE NOT email_confirmed AND created_at < $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(created_before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn delete_unconfirmed_account(
        &self,
        user_id: UserId,
        created_before: DateTime<Utc>,
    ) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM accounts WHERE id = $1 AND NOT email_confirmed AND created_at < $2",
        )
        .bind(user_id.as_uuid())
        .bind(created_before)
        .execute(&self.pool)
        .await?;

        Ok(deleted.rows_affected() > 0)
    }
}

#[async_trait]
impl ReminderStore for PostgresStore {
    async fn last_reminder(&self, cart_id: CartId) -> Result<Option<DateTime<Utc>>> {
        let reminded: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT cart_updated_at FROM cart_reminders WHERE cart_id = $1")
                .bind(cart_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        Ok(reminded)
    }

    async fn record_reminder(
        &self,
        cart_id: CartId,
        cart_updated_at: DateTime<Utc>,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_reminders (cart_id, cart_updated_at, sent_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id) DO UPDATE SET
                cart_updated_at = EXCLUDED.cart_updated_at,
                sent_at = EXCLUDED.sent_at
            "#,
        )
        .bind(cart_id.as_uuid())
        .bind(cart_updated_at)
        .bind(sent_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return StoreError::not_found("cart", cart_id);
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }
}
