//! Partitioned event bus
//!
//! Topics divided into partitions; messages with the same partition key land
//! in the same partition in publish order. Delivery is at-least-once within a
//! consumer group, with producer-side idempotence across in-flight retries.
//! Consumers must tolerate duplicates and cross-partition reordering.

pub mod consumer;
pub mod envelope;
pub mod lag;
pub mod payloads;
pub mod producer;

pub use consumer::{EventConsumer, EventHandler};
pub use envelope::{EventEnvelope, EventKind, PartitionKey, Topics};
pub use lag::LagMonitor;
pub use producer::EventProducer;
