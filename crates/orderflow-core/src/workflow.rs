//! End-to-end workflow tracking
//!
//! Records when each order enters the pipeline and observes the customer-facing
//! SLA metric when it reaches a terminal state.

use chrono::Utc;
use uuid::Uuid;

use crate::cache::{Cache, CacheKeys};
use crate::metrics::names;
use crate::models::OrderStatus;
use crate::Result;

const TRACKING_TTL_SECONDS: u64 = 3600;

#[derive(Clone)]
pub struct WorkflowTracker {
    cache: Cache,
}

impl WorkflowTracker {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    /// Record that an order entered the pipeline
    pub async fn order_started(&self, order_id: Uuid) -> Result<()> {
        let key = CacheKeys::workflow_started(order_id);
        let started_ms = Utc::now().timestamp_millis();
        self.cache.set_json(&key, &started_ms, TRACKING_TTL_SECONDS).await
    }

    /// Observe end-to-end latency once the order is terminal
    ///
    /// Missing start timestamps (expired or from before a restart) are
    /// skipped silently; the metric only sees complete journeys.
    pub async fn order_completed(&self, order_id: Uuid, terminal: OrderStatus) -> Result<()> {
        let key = CacheKeys::workflow_started(order_id);
        let Some(started_ms) = self.cache.get_json::<i64>(&key).await? else {
            return Ok(());
        };

        let elapsed_ms = Utc::now().timestamp_millis() - started_ms;
        if elapsed_ms >= 0 {
            metrics::histogram!(names::ORDER_E2E_LATENCY)
                .record(elapsed_ms as f64 / 1000.0);
        }
        self.cache.delete(&key).await?;

        tracing::info!(
            "Order {} reached {} in {}ms",
            order_id,
            terminal.as_str(),
            elapsed_ms
        );
        Ok(())
    }
}
