//! Typed event payloads
//!
//! Each event kind carries a fixed snake_case JSON payload inside the
//! envelope. These structs are the single source of truth for those shapes on
//! both the producing and consuming side.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailedItem;

/// One order line as carried on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// `order.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub items: Vec<EventOrderItem>,
    /// Client-supplied reservation idempotency key, when given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// `order.confirmed`, `order.cancelled`, `order.failed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `inventory.reserved`, echoing the order context so the saga can initiate
/// payment without a cross-service read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_amount: Decimal,
    pub reservation_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub items: Vec<EventOrderItem>,
}

/// `inventory.rejected`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRejectedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub failed_items: Vec<FailedItem>,
}

/// `inventory.released`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReleasedPayload {
    pub order_id: Uuid,
    pub reason: String,
}

/// `inventory.confirm` / `inventory.release`: saga instructions addressed to
/// the reservation group of one order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationGroupPayload {
    pub order_id: Uuid,
}

/// `inventory.updated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUpdatedPayload {
    pub product_id: Uuid,
    pub stock_quantity: i32,
}

/// `inventory.stock_low`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLowPayload {
    pub product_id: Uuid,
    pub product_name: String,
    pub available_quantity: i32,
}

/// `payment.initiated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiatedPayload {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
}

/// `payment.completed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub transaction_id: String,
}

/// `payment.failed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub payment_id: Option<Uuid>,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub error: String,
}

/// `payment.refunded`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRefundedPayload {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub refund_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `user.registered`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisteredPayload {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_created_wire_shape() {
        let payload = OrderCreatedPayload {
            order_id: Uuid::nil(),
            user_id: Uuid::nil(),
            total_amount: dec!(45.00),
            items: vec![EventOrderItem {
                product_id: Uuid::nil(),
                quantity: 2,
                unit_price: dec!(10.00),
            }],
            idempotency_key: None,
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("order_id").is_some());
        assert!(value.get("total_amount").is_some());
        assert_eq!(value["items"][0]["quantity"], 2);
    }

    #[test]
    fn test_optional_reason_is_omitted() {
        let payload = OrderStatusPayload {
            order_id: Uuid::nil(),
            user_id: Uuid::nil(),
            reason: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("reason").is_none());
    }
}
