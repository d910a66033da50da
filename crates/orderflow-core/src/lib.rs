//! Orderflow core
//!
//! Event-driven transactional core of the order-processing platform: the
//! partitioned event bus, transactional outbox, idempotent consumers, the
//! inventory reservation engine, the order saga and the payment processor.

pub mod bus;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod idempotency;
pub mod inventory;
pub mod metrics;
pub mod models;
pub mod orders;
pub mod outbox;
pub mod payment;
pub mod repository;
pub mod users;
pub mod workflow;

// Re-export commonly used types
pub use bus::{EventConsumer, EventEnvelope, EventHandler, EventKind, EventProducer, LagMonitor, PartitionKey, Topics};
pub use cache::{Cache, CacheKeys};
pub use config::Config;
pub use db::{auto_migrate, Migrator};
pub use error::{Error, FailedItem, Result};
pub use idempotency::IdempotencyStore;
pub use inventory::{ExpirySweeper, InventoryEventHandler, InventoryService};
pub use orders::{OrderSagaHandler, OrderService};
pub use outbox::{OutboxEvent, OutboxPublisher, OutboxRepository, OutboxStatus};
pub use payment::{MockGateway, PaymentEventHandler, PaymentGateway, PaymentService};
pub use repository::{create_pool, Database};
pub use users::AuthService;
pub use workflow::WorkflowTracker;

/// Current version of orderflow
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_creation() {
        let err = Error::validation("Test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}
