//! Order saga coordinator
//!
//! Drives an order to a terminal state by reacting to inventory and payment
//! events. Transitions use conditional UPDATEs so replayed or racing events
//! settle idempotently; events for orders already terminal are logged and
//! ignored.

use uuid::Uuid;

use crate::bus::consumer::EventHandler;
use crate::bus::envelope::{EventEnvelope, EventKind, PartitionKey, Topics};
use crate::bus::payloads::{
    InventoryRejectedPayload, InventoryReservedPayload, OrderStatusPayload,
    PaymentCompletedPayload, PaymentFailedPayload, PaymentInitiatedPayload,
    ReservationGroupPayload,
};
use crate::cache::{Cache, CacheKeys};
use crate::models::{Order, OrderStatus};
use crate::orders::service::record_transition;
use crate::outbox::{OutboxEvent, OutboxRepository};
use crate::repository::Database;
use crate::workflow::WorkflowTracker;
use crate::{Error, Result};

pub struct OrderSagaHandler {
    db: Database,
    cache: Cache,
    workflow: WorkflowTracker,
}

impl OrderSagaHandler {
    pub fn new(db: Database, cache: Cache) -> Self {
        let workflow = WorkflowTracker::new(cache.clone());
        Self { db, cache, workflow }
    }

    /// Load the order, ignoring events for unknown or terminal orders
    async fn load_active(&self, order_id: Uuid, event: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(self.db.pool())
            .await?;

        match order {
            None => {
                tracing::warn!("Ignoring {} for unknown order {}", event, order_id);
                Ok(None)
            }
            Some(order) if order.status.is_terminal() => {
                tracing::info!(
                    "Ignoring {} for order {} already in terminal state {}",
                    event,
                    order_id,
                    order.status.as_str()
                );
                Ok(None)
            }
            Some(order) => Ok(Some(order)),
        }
    }

    /// Inventory held the stock; ask the payment service to charge
    async fn on_inventory_reserved(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: InventoryReservedPayload = serde_json::from_value(envelope.payload.clone())?;

        let Some(_order) = self.load_active(payload.order_id, "inventory.reserved").await? else {
            return Ok(());
        };

        tracing::info!("Inventory reserved for order {}", payload.order_id);

        let mut tx = self.db.pool().begin().await?;
        let event = OutboxEvent::new(
            "order",
            &payload.order_id.to_string(),
            EventKind::PaymentInitiated.as_str(),
            serde_json::to_value(PaymentInitiatedPayload {
                order_id: payload.order_id,
                user_id: payload.user_id,
                amount: payload.total_amount,
            })?,
            Topics::PAYMENTS,
            &PartitionKey::payment(payload.order_id),
        );
        OutboxRepository::insert(&mut tx, &event).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Inventory could not hold the stock; the order fails
    async fn on_inventory_rejected(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: InventoryRejectedPayload = serde_json::from_value(envelope.payload.clone())?;

        let Some(order) = self.load_active(payload.order_id, "inventory.rejected").await? else {
            return Ok(());
        };

        tracing::info!(
            "Inventory rejected for order {}: {} item(s) short",
            payload.order_id,
            payload.failed_items.len()
        );

        self.fail_order(&order, payload.user_id, "insufficient_stock", false)
            .await
    }

    /// Payment cleared; the order confirms and stock is sold
    async fn on_payment_completed(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: PaymentCompletedPayload = serde_json::from_value(envelope.payload.clone())?;

        let Some(order) = self.load_active(payload.order_id, "payment.completed").await? else {
            return Ok(());
        };

        let mut tx = self.db.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = 'confirmed', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(payload.order_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tracing::info!(
                "Order {} no longer pending, skipping confirmation",
                payload.order_id
            );
            return Ok(());
        }

        let confirmed = OutboxEvent::new(
            "order",
            &payload.order_id.to_string(),
            EventKind::OrderConfirmed.as_str(),
            serde_json::to_value(OrderStatusPayload {
                order_id: payload.order_id,
                user_id: payload.user_id,
                reason: None,
            })?,
            Topics::ORDERS,
            &PartitionKey::order(payload.order_id),
        );
        OutboxRepository::insert(&mut tx, &confirmed).await?;

        let confirm_stock = OutboxEvent::new(
            "order",
            &payload.order_id.to_string(),
            EventKind::InventoryConfirm.as_str(),
            serde_json::to_value(ReservationGroupPayload {
                order_id: payload.order_id,
            })?,
            Topics::INVENTORY,
            &PartitionKey::order(payload.order_id),
        );
        OutboxRepository::insert(&mut tx, &confirm_stock).await?;

        tx.commit().await?;

        record_transition(order.status, OrderStatus::Confirmed);
        self.finish_order(payload.order_id, OrderStatus::Confirmed).await;

        tracing::info!("Order confirmed: {}", payload.order_id);
        Ok(())
    }

    /// Payment declined; the order fails and held stock goes back
    async fn on_payment_failed(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: PaymentFailedPayload = serde_json::from_value(envelope.payload.clone())?;

        let Some(order) = self.load_active(payload.order_id, "payment.failed").await? else {
            return Ok(());
        };

        tracing::info!(
            "Payment failed for order {}: {}",
            payload.order_id,
            payload.error
        );

        self.fail_order(&order, payload.user_id, &payload.error, true).await
    }

    /// Transition Pending -> Failed, emitting `order.failed` and optionally
    /// handing reservations back
    async fn fail_order(
        &self,
        order: &Order,
        user_id: Uuid,
        reason: &str,
        release_inventory: bool,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = 'failed', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tracing::info!("Order {} no longer pending, skipping failure", order.id);
            return Ok(());
        }

        let failed = OutboxEvent::new(
            "order",
            &order.id.to_string(),
            EventKind::OrderFailed.as_str(),
            serde_json::to_value(OrderStatusPayload {
                order_id: order.id,
                user_id,
                reason: Some(reason.to_string()),
            })?,
            Topics::ORDERS,
            &PartitionKey::order(order.id),
        );
        OutboxRepository::insert(&mut tx, &failed).await?;

        if release_inventory {
            let release = OutboxEvent::new(
                "order",
                &order.id.to_string(),
                EventKind::InventoryRelease.as_str(),
                serde_json::to_value(ReservationGroupPayload { order_id: order.id })?,
                Topics::INVENTORY,
                &PartitionKey::order(order.id),
            );
            OutboxRepository::insert(&mut tx, &release).await?;
        }

        tx.commit().await?;

        record_transition(order.status, OrderStatus::Failed);
        self.finish_order(order.id, OrderStatus::Failed).await;

        tracing::info!("Order failed: {} ({})", order.id, reason);
        Ok(())
    }

    /// Best-effort bookkeeping once a terminal transition committed; a cache
    /// blip here must not push the event back through the retry path
    async fn finish_order(&self, order_id: Uuid, terminal: OrderStatus) {
        if let Err(e) = self.cache.delete(&CacheKeys::order(order_id)).await {
            tracing::warn!("Cache invalidation failed for order {}: {}", order_id, e);
        }
        if let Err(e) = self.workflow.order_completed(order_id, terminal).await {
            tracing::warn!("Workflow tracking failed for order {}: {}", order_id, e);
        }
    }
}

#[async_trait::async_trait]
impl EventHandler for OrderSagaHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match envelope.kind() {
            EventKind::InventoryReserved => self.on_inventory_reserved(envelope).await,
            EventKind::InventoryRejected => self.on_inventory_rejected(envelope).await,
            EventKind::PaymentCompleted => self.on_payment_completed(envelope).await,
            EventKind::PaymentFailed => self.on_payment_failed(envelope).await,
            other => Err(Error::Other(format!(
                "Saga received unexpected event: {}",
                other.as_str()
            ))),
        }
    }
}
