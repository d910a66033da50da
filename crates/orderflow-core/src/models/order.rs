use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Order entity (order-owned aggregate root)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order line item
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Failed
        )
    }

    /// Legal transitions form a tree rooted at Pending
    pub fn can_transition_to(&self, new_status: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, new_status) {
            (Pending, Confirmed) => true,
            (Pending, Cancelled) => true,
            (Pending, Failed) => true,

            (Confirmed, Processing) => true,
            (Confirmed, Cancelled) => true,

            (Processing, Shipped) => true,
            (Shipped, Delivered) => true,

            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
        }
    }
}

/// Create order item payload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateOrderItem {
    pub product_id: Uuid,

    #[validate(length(min = 1, max = 255))]
    pub product_name: String,

    #[validate(range(min = 1))]
    pub quantity: i32,

    pub unit_price: Decimal,
}

/// Create order request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<CreateOrderItem>,

    #[validate(length(min = 1, max = 500))]
    pub shipping_address: String,

    /// Optional client-supplied key for idempotent reservation
    pub idempotency_key: Option<String>,
}

impl CreateOrderRequest {
    /// `totalAmount = Σ quantity × unitPrice`, fixed at creation
    pub fn total_amount(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum()
    }
}

/// Order view with items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub shipping_address: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl OrderResponse {
    pub fn from_parts(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            created_at: order.created_at,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Failed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Cancelled));
    }

    #[test]
    fn test_terminal_states_accept_nothing() {
        use OrderStatus::*;

        for terminal in [Delivered, Cancelled, Failed] {
            assert!(terminal.is_terminal());
            for target in [Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Failed] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_total_amount_is_exact() {
        let request = CreateOrderRequest {
            items: vec![
                CreateOrderItem {
                    product_id: Uuid::new_v4(),
                    product_name: "p1".to_string(),
                    quantity: 2,
                    unit_price: dec!(10.00),
                },
                CreateOrderItem {
                    product_id: Uuid::new_v4(),
                    product_name: "p3".to_string(),
                    quantity: 1,
                    unit_price: dec!(25.00),
                },
            ],
            shipping_address: "1 Main St".to_string(),
            idempotency_key: None,
        };

        assert_eq!(request.total_amount(), dec!(45.00));
    }

    #[test]
    fn test_empty_order_rejected() {
        let request = CreateOrderRequest {
            items: vec![],
            shipping_address: "1 Main St".to_string(),
            idempotency_key: None,
        };
        assert!(request.validate().is_err());
    }
}
