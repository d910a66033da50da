//! Order service
//!
//! Owns the order aggregate. Creation writes the order, its items and the
//! `order.created` outbox row in one local transaction; everything after that
//! is driven by events.

use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::bus::envelope::{EventKind, PartitionKey, Topics};
use crate::bus::payloads::{EventOrderItem, OrderCreatedPayload, OrderStatusPayload, ReservationGroupPayload};
use crate::cache::{Cache, CacheKeys};
use crate::metrics::names;
use crate::models::{CreateOrderRequest, Order, OrderItem, OrderResponse, OrderStatus};
use crate::outbox::{OutboxEvent, OutboxRepository};
use crate::repository::Database;
use crate::workflow::WorkflowTracker;
use crate::{Error, Result};

const ORDER_CACHE_TTL: u64 = 300;

pub struct OrderService {
    db: Database,
    cache: Cache,
    workflow: WorkflowTracker,
}

impl OrderService {
    pub fn new(db: Database, cache: Cache) -> Self {
        let workflow = WorkflowTracker::new(cache.clone());
        Self { db, cache, workflow }
    }

    /// Create a new order in Pending and enqueue `order.created`
    pub async fn create_order(
        &self,
        user_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse> {
        request
            .validate()
            .map_err(|e| Error::validation(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for item in &request.items {
            if item.quantity <= 0 {
                return Err(Error::validation("Item quantity must be positive"));
            }
            if item.unit_price < Decimal::ZERO {
                return Err(Error::validation("Unit price cannot be negative"));
            }
            // One line per SKU; the reservation group is keyed by (order, SKU)
            if !seen.insert(item.product_id) {
                return Err(Error::validation("Duplicate product in order items"));
            }
        }

        let order_id = Uuid::new_v4();
        let total_amount = request.total_amount();

        let mut tx = self.db.pool().begin().await?;

        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount, shipping_address)
            VALUES ($1, $2, 'pending', $3, $4)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(total_amount)
        .bind(&request.shipping_address)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let row = sqlx::query_as::<_, OrderItem>(
                r#"
                INSERT INTO order_items (id, order_id, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(row);
        }

        let payload = OrderCreatedPayload {
            order_id,
            user_id,
            total_amount,
            items: request
                .items
                .iter()
                .map(|item| EventOrderItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            idempotency_key: request.idempotency_key.clone(),
        };
        let event = OutboxEvent::new(
            "order",
            &order_id.to_string(),
            EventKind::OrderCreated.as_str(),
            serde_json::to_value(&payload)?,
            Topics::ORDERS,
            &PartitionKey::order(order_id),
        );
        OutboxRepository::insert(&mut tx, &event).await?;

        tx.commit().await?;

        // The order is durable; tracking is best-effort from here
        if let Err(e) = self.workflow.order_started(order_id).await {
            tracing::warn!("Workflow tracking failed for order {}: {}", order_id, e);
        }

        tracing::info!("Order created: {}", order_id);
        Ok(OrderResponse::from_parts(order, items))
    }

    /// List a user's orders, newest first
    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<OrderResponse>> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order in orders {
            responses.push(OrderResponse::from_parts(order, Vec::new()));
        }
        Ok(responses)
    }

    /// Get order details with items
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderResponse> {
        let cache_key = CacheKeys::order(order_id);
        if let Some(cached) = self.cache.get_json::<OrderResponse>(&cache_key).await? {
            if cached.user_id == user_id {
                return Ok(cached);
            }
        }

        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| Error::not_found("Order not found"))?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(self.db.pool())
        .await?;

        let response = OrderResponse::from_parts(order, items);
        self.cache
            .set_json(&cache_key, &response, ORDER_CACHE_TTL)
            .await?;

        Ok(response)
    }

    /// Cancel an order; only non-terminal, pre-shipment states qualify
    pub async fn cancel_order(&self, user_id: Uuid, order_id: Uuid) -> Result<()> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = $1 AND user_id = $2",
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| Error::not_found("Order not found"))?;

        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(Error::conflict(format!(
                "Cannot cancel order in {} status",
                order.status.as_str()
            )));
        }

        let mut tx = self.db.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = 'cancelled', updated_at = NOW() WHERE id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(order.status)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            // A racing event transitioned the order first
            return Err(Error::conflict("Order status changed concurrently"));
        }

        let cancelled = OutboxEvent::new(
            "order",
            &order_id.to_string(),
            EventKind::OrderCancelled.as_str(),
            serde_json::to_value(OrderStatusPayload {
                order_id,
                user_id,
                reason: None,
            })?,
            Topics::ORDERS,
            &PartitionKey::order(order_id),
        );
        OutboxRepository::insert(&mut tx, &cancelled).await?;

        // Any reservations still pending get handed back
        let release = OutboxEvent::new(
            "order",
            &order_id.to_string(),
            EventKind::InventoryRelease.as_str(),
            serde_json::to_value(ReservationGroupPayload { order_id })?,
            Topics::INVENTORY,
            &PartitionKey::order(order_id),
        );
        OutboxRepository::insert(&mut tx, &release).await?;

        tx.commit().await?;

        record_transition(order.status, OrderStatus::Cancelled);
        if let Err(e) = self.cache.delete(&CacheKeys::order(order_id)).await {
            tracing::warn!("Cache invalidation failed for order {}: {}", order_id, e);
        }
        if let Err(e) = self
            .workflow
            .order_completed(order_id, OrderStatus::Cancelled)
            .await
        {
            tracing::warn!("Workflow tracking failed for order {}: {}", order_id, e);
        }

        tracing::info!("Order cancelled: {}", order_id);
        Ok(())
    }
}

/// Count a state transition for the dashboard
pub fn record_transition(from: OrderStatus, to: OrderStatus) {
    metrics::counter!(
        names::ORDER_STATE_TRANSITIONS,
        "from_state" => from.as_str(),
        "to_state" => to.as_str(),
    )
    .increment(1);
}
