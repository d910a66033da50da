use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Standard event envelope carried by every bus message
///
/// The wire format is fixed: snake_case keys, RFC3339 UTC timestamp, UUID
/// strings. `event_id` doubles as the idempotency key and equals the
/// producing outbox row's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub source_service: String,
    pub payload: Value,
    #[serde(default)]
    pub retry_count: i32,
}

impl EventEnvelope {
    pub fn new(
        event_id: Uuid,
        event_type: &str,
        correlation_id: Uuid,
        source_service: &str,
        payload: Value,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            correlation_id,
            source_service: source_service.to_string(),
            payload,
            retry_count: 0,
        }
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event_type)
    }
}

/// Kafka topics
pub struct Topics;

impl Topics {
    pub const USERS: &'static str = "users";
    pub const ORDERS: &'static str = "orders";
    pub const INVENTORY: &'static str = "inventory";
    pub const PAYMENTS: &'static str = "payments";
    pub const DEAD_LETTER: &'static str = "dead-letter";
}

/// Tagged union over the event vocabulary
///
/// Dispatch happens over this enum rather than raw strings; unknown kinds are
/// skipped with a log, never a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UserRegistered,
    OrderCreated,
    OrderConfirmed,
    OrderCancelled,
    OrderFailed,
    InventoryReserved,
    InventoryRejected,
    InventoryReleased,
    InventoryConfirm,
    InventoryRelease,
    InventoryUpdated,
    StockLow,
    PaymentInitiated,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserRegistered => "user.registered",
            EventKind::OrderCreated => "order.created",
            EventKind::OrderConfirmed => "order.confirmed",
            EventKind::OrderCancelled => "order.cancelled",
            EventKind::OrderFailed => "order.failed",
            EventKind::InventoryReserved => "inventory.reserved",
            EventKind::InventoryRejected => "inventory.rejected",
            EventKind::InventoryReleased => "inventory.released",
            EventKind::InventoryConfirm => "inventory.confirm",
            EventKind::InventoryRelease => "inventory.release",
            EventKind::InventoryUpdated => "inventory.updated",
            EventKind::StockLow => "inventory.stock_low",
            EventKind::PaymentInitiated => "payment.initiated",
            EventKind::PaymentCompleted => "payment.completed",
            EventKind::PaymentFailed => "payment.failed",
            EventKind::PaymentRefunded => "payment.refunded",
            EventKind::Unknown => "unknown",
        }
    }

    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "user.registered" => EventKind::UserRegistered,
            "order.created" => EventKind::OrderCreated,
            "order.confirmed" => EventKind::OrderConfirmed,
            "order.cancelled" => EventKind::OrderCancelled,
            "order.failed" => EventKind::OrderFailed,
            "inventory.reserved" => EventKind::InventoryReserved,
            "inventory.rejected" => EventKind::InventoryRejected,
            "inventory.released" => EventKind::InventoryReleased,
            "inventory.confirm" => EventKind::InventoryConfirm,
            "inventory.release" => EventKind::InventoryRelease,
            "inventory.updated" => EventKind::InventoryUpdated,
            "inventory.stock_low" => EventKind::StockLow,
            "payment.initiated" => EventKind::PaymentInitiated,
            "payment.completed" => EventKind::PaymentCompleted,
            "payment.failed" => EventKind::PaymentFailed,
            "payment.refunded" => EventKind::PaymentRefunded,
            _ => EventKind::Unknown,
        }
    }
}

/// Partition key strategies for ordering guarantees
///
/// Same key, same partition, same delivery order. Orders and payments key by
/// order ID so an entire saga is totally ordered; SKU-level stock events key
/// by SKU so same-SKU updates serialize across producers.
pub struct PartitionKey;

impl PartitionKey {
    pub fn order(order_id: Uuid) -> String {
        format!("order:{}", order_id)
    }

    pub fn sku(sku_id: Uuid) -> String {
        format!("sku:{}", sku_id)
    }

    pub fn payment(order_id: Uuid) -> String {
        format!("payment:{}", order_id)
    }

    pub fn user(user_id: Uuid) -> String {
        format!("user:{}", user_id)
    }

    pub fn dead_letter(event_id: Uuid) -> String {
        format!("dlq:{}", event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_format() {
        let envelope = EventEnvelope::new(
            Uuid::nil(),
            "order.created",
            Uuid::nil(),
            "order-service",
            json!({"order_id": "abc"}),
        );

        let value = serde_json::to_value(&envelope).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "event_id",
            "event_type",
            "timestamp",
            "correlation_id",
            "source_service",
            "payload",
            "retry_count",
        ] {
            assert!(object.contains_key(field), "missing field {}", field);
        }
        assert_eq!(object.len(), 7);
        assert_eq!(object["event_type"], "order.created");
        assert_eq!(object["retry_count"], 0);
    }

    #[test]
    fn test_envelope_round_trip() {
        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            "payment.completed",
            Uuid::new_v4(),
            "payment-service",
            json!({"amount": "45.00"}),
        );

        let raw = serde_json::to_string(&envelope).unwrap();
        let back: EventEnvelope = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            EventKind::UserRegistered,
            EventKind::OrderCreated,
            EventKind::OrderConfirmed,
            EventKind::OrderCancelled,
            EventKind::OrderFailed,
            EventKind::InventoryReserved,
            EventKind::InventoryRejected,
            EventKind::InventoryReleased,
            EventKind::InventoryConfirm,
            EventKind::InventoryRelease,
            EventKind::InventoryUpdated,
            EventKind::StockLow,
            EventKind::PaymentInitiated,
            EventKind::PaymentCompleted,
            EventKind::PaymentFailed,
            EventKind::PaymentRefunded,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_unknown_event_kind() {
        assert_eq!(EventKind::parse("order.shredded"), EventKind::Unknown);
    }

    #[test]
    fn test_partition_keys() {
        let id = Uuid::nil();
        assert_eq!(PartitionKey::order(id), format!("order:{}", id));
        assert_eq!(PartitionKey::sku(id), format!("sku:{}", id));
        assert_eq!(PartitionKey::payment(id), format!("payment:{}", id));
        assert_eq!(PartitionKey::user(id), format!("user:{}", id));
        assert_eq!(PartitionKey::dead_letter(id), format!("dlq:{}", id));
    }
}
