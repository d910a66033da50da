//! Inventory reservation engine
//!
//! The consistency kernel. For every SKU at every committed state:
//! `stock >= reserved >= 0`. The single conditional UPDATE is the per-SKU
//! serialization point; no read-modify-write ever happens outside it.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::bus::envelope::{EventKind, PartitionKey, Topics};
use crate::bus::payloads::{
    EventOrderItem, InventoryRejectedPayload, InventoryReleasedPayload, InventoryReservedPayload,
    InventoryUpdatedPayload, StockLowPayload,
};
use crate::cache::{Cache, CacheKeys};
use crate::config::OpsConfig;
use crate::error::FailedItem;
use crate::metrics::names;
use crate::models::{
    CreateProductRequest, Product, ProductResponse, Reservation, ReservationStatus,
    ReserveOutcome, StockUpdateRequest,
};
use crate::outbox::{OutboxEvent, OutboxRepository};
use crate::repository::Database;
use crate::{Error, Result};

const PRODUCT_CACHE_TTL: u64 = 300;
const IDEMPOTENCY_TTL: u64 = 3600;

pub struct InventoryService {
    db: Database,
    cache: Cache,
    ops: OpsConfig,
}

impl InventoryService {
    pub fn new(db: Database, cache: Cache, ops: OpsConfig) -> Self {
        Self { db, cache, ops }
    }

    /// List products, optionally by category, with a cache read-through
    pub async fn list_products(&self, category: Option<&str>) -> Result<Vec<ProductResponse>> {
        let cache_key = CacheKeys::product_list(category);
        if let Some(cached) = self.cache.get_json::<Vec<ProductResponse>>(&cache_key).await? {
            return Ok(cached);
        }

        let products = match category {
            Some(category) => {
                sqlx::query_as::<_, Product>(
                    "SELECT * FROM products WHERE category = $1 ORDER BY name",
                )
                .bind(category)
                .fetch_all(self.db.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name")
                    .fetch_all(self.db.pool())
                    .await?
            }
        };

        let response: Vec<ProductResponse> =
            products.into_iter().map(ProductResponse::from).collect();
        self.cache
            .set_json(&cache_key, &response, PRODUCT_CACHE_TTL)
            .await?;

        Ok(response)
    }

    /// Get product details
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductResponse> {
        let cache_key = CacheKeys::product(product_id);
        if let Some(cached) = self.cache.get_json::<ProductResponse>(&cache_key).await? {
            return Ok(cached);
        }

        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| Error::not_found("Product not found"))?;

        let response = ProductResponse::from(product);
        self.cache
            .set_json(&cache_key, &response, PRODUCT_CACHE_TTL)
            .await?;

        Ok(response)
    }

    /// Create a new product
    pub async fn create_product(&self, request: CreateProductRequest) -> Result<ProductResponse> {
        if request.price < Decimal::ZERO {
            return Err(Error::validation("Price cannot be negative"));
        }
        if request.stock_quantity < 0 {
            return Err(Error::validation("Stock cannot be negative"));
        }

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, name, description, category, price, stock_quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.category)
        .bind(request.price)
        .bind(request.stock_quantity)
        .fetch_one(self.db.pool())
        .await?;

        self.invalidate_product_caches(product.id, product.category.as_deref())
            .await;

        tracing::info!("Product created: {}", product.name);
        Ok(ProductResponse::from(product))
    }

    /// Admin stock adjustment with outbox notification
    pub async fn update_stock(
        &self,
        product_id: Uuid,
        request: StockUpdateRequest,
    ) -> Result<ProductResponse> {
        let mut tx = self.db.pool().begin().await?;

        let product =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::not_found("Product not found"))?;

        let new_stock = request.operation.apply(product.stock_quantity, request.quantity)?;
        if new_stock < product.reserved_quantity {
            return Err(Error::validation(format!(
                "Stock {} would fall below reserved {}",
                new_stock, product.reserved_quantity
            )));
        }

        let updated = sqlx::query_as::<_, Product>(
            "UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(product_id)
        .bind(new_stock)
        .fetch_one(&mut *tx)
        .await?;

        let update_event = OutboxEvent::new(
            "product",
            &product_id.to_string(),
            EventKind::InventoryUpdated.as_str(),
            serde_json::to_value(InventoryUpdatedPayload {
                product_id,
                stock_quantity: updated.stock_quantity,
            })?,
            Topics::INVENTORY,
            &PartitionKey::sku(product_id),
        );
        OutboxRepository::insert(&mut tx, &update_event).await?;

        if updated.available_quantity() < self.ops.low_stock_threshold {
            let low_event = OutboxEvent::new(
                "product",
                &product_id.to_string(),
                EventKind::StockLow.as_str(),
                serde_json::to_value(StockLowPayload {
                    product_id,
                    product_name: updated.name.clone(),
                    available_quantity: updated.available_quantity(),
                })?,
                Topics::INVENTORY,
                &PartitionKey::sku(product_id),
            );
            OutboxRepository::insert(&mut tx, &low_event).await?;
        }

        tx.commit().await?;

        self.invalidate_product_caches(product_id, updated.category.as_deref())
            .await;
        self.verify_invariants(&[product_id]).await;

        tracing::info!(
            "Stock updated for product {}: {}",
            product_id,
            updated.stock_quantity
        );
        Ok(ProductResponse::from(updated))
    }

    /// Reserve stock for an order
    ///
    /// Every item runs the atomic conditional reserve; a partial failure
    /// reverses the successes in the same transaction and reports the
    /// failures. The outcome event rides the same transaction via the outbox.
    ///
    /// The step is exactly-once under redelivery: rows already present for
    /// the order short-circuit before any counter moves, and the unique
    /// `(order_id, sku_id)` index backstops the guard.
    pub async fn reserve_for_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        total_amount: Decimal,
        items: &[EventOrderItem],
        idempotency_key: Option<&str>,
    ) -> Result<ReserveOutcome> {
        if let Some(key) = idempotency_key {
            let cache_key = CacheKeys::reserve_idempotency(key);
            if let Some(existing) = self.cache.get_json::<ReserveOutcome>(&cache_key).await? {
                tracing::info!("Returning existing reservation for key {}", key);
                return Ok(existing);
            }
        }

        // A replay whose first pass committed but errored before reporting
        // back must not reserve again
        if let Some(existing) = self.existing_group(order_id).await? {
            tracing::info!("Order {} already has a reservation group", order_id);
            return Ok(existing);
        }

        let group_id = Uuid::new_v4();
        let now = Utc::now();
        let expires_at = now + ChronoDuration::seconds(self.ops.reservation_ttl_seconds);

        let mut tx = self.db.pool().begin().await?;
        let mut reserved: Vec<&EventOrderItem> = Vec::new();
        let mut failed_items: Vec<FailedItem> = Vec::new();

        for item in items {
            let result = sqlx::query(
                r#"
                UPDATE products
                SET reserved_quantity = reserved_quantity + $2, updated_at = NOW()
                WHERE id = $1 AND (stock_quantity - reserved_quantity) >= $2
                "#,
            )
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                reserved.push(item);
            } else {
                failed_items.push(FailedItem {
                    sku_id: item.product_id,
                    requested: item.quantity,
                    reason: "insufficient_stock".to_string(),
                });
            }
        }

        let outcome = if failed_items.is_empty() {
            for item in &reserved {
                sqlx::query(
                    r#"
                    INSERT INTO reservations (id, group_id, order_id, sku_id, quantity, status, created_at, expires_at)
                    VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(group_id)
                .bind(order_id)
                .bind(item.product_id)
                .bind(item.quantity)
                .bind(now)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
            }

            let payload = InventoryReservedPayload {
                order_id,
                user_id,
                total_amount,
                reservation_id: group_id,
                expires_at,
                items: items.to_vec(),
            };
            let event = OutboxEvent::new(
                "reservation",
                &order_id.to_string(),
                EventKind::InventoryReserved.as_str(),
                serde_json::to_value(&payload)?,
                Topics::INVENTORY,
                &PartitionKey::order(order_id),
            );
            OutboxRepository::insert(&mut tx, &event).await?;

            ReserveOutcome::reserved(order_id, group_id, expires_at)
        } else {
            // Reverse the successful reserves so the commit is all-or-nothing
            for item in &reserved {
                sqlx::query(
                    r#"
                    UPDATE products
                    SET reserved_quantity = reserved_quantity - $2, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(item.product_id)
                .bind(item.quantity)
                .execute(&mut *tx)
                .await?;
            }

            let payload = InventoryRejectedPayload {
                order_id,
                user_id,
                failed_items: failed_items.clone(),
            };
            let event = OutboxEvent::new(
                "reservation",
                &order_id.to_string(),
                EventKind::InventoryRejected.as_str(),
                serde_json::to_value(&payload)?,
                Topics::INVENTORY,
                &PartitionKey::order(order_id),
            );
            OutboxRepository::insert(&mut tx, &event).await?;

            ReserveOutcome::rejected(order_id, failed_items)
        };

        tx.commit().await?;

        // The reservation is durable; nothing past this point may fail the
        // handler and force a replay
        if outcome.success {
            if let Some(key) = idempotency_key {
                if let Err(e) = self
                    .cache
                    .set_json(&CacheKeys::reserve_idempotency(key), &outcome, IDEMPOTENCY_TTL)
                    .await
                {
                    tracing::warn!("Failed to store reservation mapping for {}: {}", key, e);
                }
            }
            tracing::info!(
                "Reserved stock for order {}: {} items, expires at {}",
                order_id,
                items.len(),
                expires_at
            );
        } else {
            tracing::info!(
                "Reservation rejected for order {}: {} item(s) short",
                order_id,
                outcome.failed_items.len()
            );
        }

        let touched: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        self.verify_invariants(&touched).await;
        self.invalidate_products(&touched).await;

        Ok(outcome)
    }

    /// Load an already-committed reservation group for an order, if any
    async fn existing_group(&self, order_id: Uuid) -> Result<Option<ReserveOutcome>> {
        let row: Option<(Uuid, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT group_id, expires_at FROM reservations WHERE order_id = $1 LIMIT 1",
        )
        .bind(order_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|(group_id, expires_at)| {
            ReserveOutcome::reserved(order_id, group_id, expires_at)
        }))
    }

    /// Confirm the reservation group after a completed payment
    ///
    /// Moves reserved units to sold. Only Pending reservations transition;
    /// a racing release or expiry wins through the status predicate, which
    /// makes replays no-ops.
    pub async fn confirm_order(&self, order_id: Uuid) -> Result<usize> {
        let mut tx = self.db.pool().begin().await?;

        let confirmed = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = 'confirmed', confirmed_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        for reservation in &confirmed {
            sqlx::query(
                r#"
                UPDATE products
                SET reserved_quantity = reserved_quantity - $2,
                    stock_quantity = stock_quantity - $2,
                    sold_quantity = sold_quantity + $2,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(reservation.sku_id)
            .bind(reservation.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        if confirmed.is_empty() {
            tracing::info!("No pending reservations to confirm for order {}", order_id);
            return Ok(0);
        }

        let touched: Vec<Uuid> = confirmed.iter().map(|r| r.sku_id).collect();
        self.verify_invariants(&touched).await;
        self.invalidate_products(&touched).await;

        tracing::info!("Confirmed reservation for order {}", order_id);
        Ok(confirmed.len())
    }

    /// Release the reservation group, returning reserved units to available
    ///
    /// Used for payment failures, cancellations and expiry. Terminal
    /// reservations are untouched, so release-after-confirm is a no-op.
    pub async fn release_order(&self, order_id: Uuid, reason: &str) -> Result<usize> {
        let status = if reason == "expired" {
            ReservationStatus::Expired
        } else {
            ReservationStatus::Released
        };

        let mut tx = self.db.pool().begin().await?;

        let released = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = $2, released_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(status)
        .fetch_all(&mut *tx)
        .await?;

        for reservation in &released {
            sqlx::query(
                r#"
                UPDATE products
                SET reserved_quantity = reserved_quantity - $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(reservation.sku_id)
            .bind(reservation.quantity)
            .execute(&mut *tx)
            .await?;
        }

        if !released.is_empty() {
            let payload = InventoryReleasedPayload {
                order_id,
                reason: reason.to_string(),
            };
            let event = OutboxEvent::new(
                "reservation",
                &order_id.to_string(),
                EventKind::InventoryReleased.as_str(),
                serde_json::to_value(&payload)?,
                Topics::INVENTORY,
                &PartitionKey::order(order_id),
            );
            OutboxRepository::insert(&mut tx, &event).await?;
        }

        tx.commit().await?;

        if released.is_empty() {
            tracing::info!("No pending reservations to release for order {}", order_id);
            return Ok(0);
        }

        let touched: Vec<Uuid> = released.iter().map(|r| r.sku_id).collect();
        self.verify_invariants(&touched).await;
        self.invalidate_products(&touched).await;

        tracing::info!("Released reservation for order {}: {}", order_id, reason);
        Ok(released.len())
    }

    /// Release every overdue Pending reservation; called by the sweeper
    pub async fn expire_due(&self) -> Result<usize> {
        let orders: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT order_id FROM reservations
            WHERE status = 'pending' AND expires_at < NOW()
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut expired = 0usize;
        for (order_id,) in orders {
            expired += self.release_order(order_id, "expired").await?;
        }

        Ok(expired)
    }

    /// Post-commit invariant verification
    ///
    /// Any violating row is an oversell incident. The counter's only
    /// acceptable value is zero. Runs after the commit, so a probe failure is
    /// logged rather than propagated.
    async fn verify_invariants(&self, sku_ids: &[Uuid]) {
        if sku_ids.is_empty() {
            return;
        }

        let violations: Vec<(Uuid, i32, i32)> = match sqlx::query_as(
            r#"
            SELECT id, stock_quantity, reserved_quantity FROM products
            WHERE id = ANY($1)
              AND (reserved_quantity > stock_quantity OR reserved_quantity < 0 OR stock_quantity < 0)
            "#,
        )
        .bind(sku_ids)
        .fetch_all(self.db.pool())
        .await
        {
            Ok(violations) => violations,
            Err(e) => {
                tracing::warn!("Invariant probe failed: {}", e);
                return;
            }
        };

        for (sku_id, stock, reserved) in violations {
            metrics::counter!(
                names::OVERSELL_INCIDENTS,
                "sku_id" => sku_id.to_string(),
            )
            .increment(1);
            tracing::error!(
                "OVERSELL INCIDENT: sku={} stock={} reserved={}",
                sku_id,
                stock,
                reserved
            );
        }
    }

    /// Drop stale product read-throughs; best-effort after a commit
    async fn invalidate_product_caches(&self, product_id: Uuid, category: Option<&str>) {
        self.try_delete(&CacheKeys::product(product_id)).await;
        self.try_delete(&CacheKeys::product_list(None)).await;
        if let Some(category) = category {
            self.try_delete(&CacheKeys::product_list(Some(category))).await;
        }
    }

    async fn invalidate_products(&self, sku_ids: &[Uuid]) {
        for sku_id in sku_ids {
            self.try_delete(&CacheKeys::product(*sku_id)).await;
        }
        self.try_delete(&CacheKeys::product_list(None)).await;
    }

    async fn try_delete(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            tracing::warn!("Cache invalidation failed for {}: {}", key, e);
        }
    }
}
