//! Inventory-side event handlers
//!
//! Consumes the `orders` topic for reservation requests and cancellations,
//! plus the saga's `inventory.confirm` / `inventory.release` instructions.

use std::sync::Arc;

use crate::bus::consumer::EventHandler;
use crate::bus::envelope::{EventEnvelope, EventKind};
use crate::bus::payloads::{OrderCreatedPayload, OrderStatusPayload, ReservationGroupPayload};
use crate::inventory::InventoryService;
use crate::{Error, Result};

pub struct InventoryEventHandler {
    service: Arc<InventoryService>,
}

impl InventoryEventHandler {
    pub fn new(service: Arc<InventoryService>) -> Self {
        Self { service }
    }

    async fn on_order_created(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: OrderCreatedPayload = serde_json::from_value(envelope.payload.clone())?;

        tracing::info!("Reserving inventory for order {}", payload.order_id);

        // The client's key wins when present; the envelope's event_id backstops
        // it so a redelivery that slipped past the idempotency store cannot
        // double-reserve
        let idempotency_key = payload
            .idempotency_key
            .clone()
            .unwrap_or_else(|| envelope.event_id.to_string());
        self.service
            .reserve_for_order(
                payload.order_id,
                payload.user_id,
                payload.total_amount,
                &payload.items,
                Some(&idempotency_key),
            )
            .await?;

        Ok(())
    }

    async fn on_order_cancelled(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: OrderStatusPayload = serde_json::from_value(envelope.payload.clone())?;

        tracing::info!("Releasing inventory for cancelled order {}", payload.order_id);
        self.service.release_order(payload.order_id, "cancelled").await?;
        Ok(())
    }

    async fn on_confirm(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: ReservationGroupPayload = serde_json::from_value(envelope.payload.clone())?;
        self.service.confirm_order(payload.order_id).await?;
        Ok(())
    }

    async fn on_release(&self, envelope: &EventEnvelope) -> Result<()> {
        let payload: ReservationGroupPayload = serde_json::from_value(envelope.payload.clone())?;
        self.service.release_order(payload.order_id, "payment_failed").await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventHandler for InventoryEventHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match envelope.kind() {
            EventKind::OrderCreated => self.on_order_created(envelope).await,
            EventKind::OrderCancelled => self.on_order_cancelled(envelope).await,
            EventKind::InventoryConfirm => self.on_confirm(envelope).await,
            EventKind::InventoryRelease => self.on_release(envelope).await,
            other => Err(Error::Other(format!(
                "Inventory handler received unexpected event: {}",
                other.as_str()
            ))),
        }
    }
}
