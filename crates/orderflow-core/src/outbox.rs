//! Transactional outbox
//!
//! Business rows and their outbox rows commit in one local transaction; a
//! background publisher drains pending rows to the bus. This closes the
//! dual-write hazard: either both the state change and its event exist, or
//! neither does. Delivery is at-least-once; downstream idempotency finishes
//! the job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::bus::EventProducer;
use crate::config::OpsConfig;
use crate::metrics::names;
use crate::repository::Database;
use crate::Result;

/// Outbox row status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "outbox_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

/// Event stored in the outbox table
///
/// The row id becomes the on-wire `event_id`, so a crash between publish and
/// mark-published yields a duplicate the consumer-side idempotency store
/// recognizes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub partition_key: String,
    pub topic: String,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
}

impl OutboxEvent {
    pub fn new(
        aggregate_type: &str,
        aggregate_id: &str,
        event_type: &str,
        payload: Value,
        topic: &str,
        partition_key: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            partition_key: partition_key.to_string(),
            topic: topic.to_string(),
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            published_at: None,
            retry_count: 0,
            error_message: None,
        }
    }
}

/// Repository for outbox rows
///
/// `insert` is always called inside the caller's business transaction.
pub struct OutboxRepository;

impl OutboxRepository {
    /// Insert an outbox row in the SAME transaction as the business rows
    pub async fn insert(conn: &mut sqlx::PgConnection, event: &OutboxEvent) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events
            (id, aggregate_type, aggregate_id, event_type, payload,
             partition_key, topic, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(&event.aggregate_type)
        .bind(&event.aggregate_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(&event.partition_key)
        .bind(&event.topic)
        .bind(event.status)
        .bind(event.created_at)
        .execute(conn)
        .await?;

        Ok(event.id)
    }

    /// Lock a batch of pending rows; concurrent publishers skip locked rows
    pub async fn fetch_pending(
        conn: &mut sqlx::PgConnection,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>> {
        let events = sqlx::query_as::<_, OutboxEvent>(
            r#"
            SELECT * FROM outbox_events
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(events)
    }

    pub async fn mark_published(conn: &mut sqlx::PgConnection, event_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_events SET status = 'published', published_at = NOW() WHERE id = $1",
        )
        .bind(event_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        conn: &mut sqlx::PgConnection,
        event_id: Uuid,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET status = 'failed',
                retry_count = retry_count + 1,
                error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(error)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn increment_retry(conn: &mut sqlx::PgConnection, event_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET retry_count = retry_count + 1 WHERE id = $1")
            .bind(event_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Pending rows older than the given age, the backpressure signal
    pub async fn pending_depth(db: &Database, older_than_secs: i64) -> Result<i64> {
        let (depth,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM outbox_events
            WHERE status = 'pending' AND created_at < NOW() - ($1 * INTERVAL '1 second')
            "#,
        )
        .bind(older_than_secs)
        .fetch_one(db.pool())
        .await?;

        Ok(depth)
    }
}

/// Background worker that drains the outbox to the bus
///
/// Polls every second when idle and runs continuously while rows are pending.
/// Survives restart mid-batch: rows only flip to Published inside the same
/// transaction that locked them, so the worst case is a re-publish the
/// idempotency store absorbs.
pub struct OutboxPublisher {
    db: Database,
    producer: EventProducer,
    service_name: String,
    batch_size: i64,
    poll_interval: Duration,
    max_retries: i32,
    alert_depth: i64,
}

impl OutboxPublisher {
    pub fn new(db: Database, producer: EventProducer, ops: &OpsConfig, service_name: &str) -> Self {
        Self {
            db,
            producer,
            service_name: service_name.to_string(),
            batch_size: ops.outbox_batch_size,
            poll_interval: Duration::from_millis(ops.outbox_poll_interval_ms),
            max_retries: ops.outbox_max_retries,
            alert_depth: ops.alert_outbox_depth,
        }
    }

    /// Run until shutdown is signalled, then drain one final batch
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Outbox publisher started for {}", self.service_name);

        loop {
            let published = match self.publish_batch().await {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!("Outbox publisher error: {}", e);
                    0
                }
            };

            if published == 0 {
                self.probe_depth().await;
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            } else if *shutdown.borrow() {
                break;
            }
        }

        // Final drain so committed rows do not sit pending across restarts
        if let Err(e) = self.publish_batch().await {
            tracing::warn!("Outbox final drain failed: {}", e);
        }
        tracing::info!("Outbox publisher stopped for {}", self.service_name);
    }

    /// Publish one batch of pending rows; returns how many went out
    pub async fn publish_batch(&self) -> Result<usize> {
        let mut tx = self.db.pool().begin().await?;
        let events = OutboxRepository::fetch_pending(&mut tx, self.batch_size).await?;

        if events.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        let mut published_count = 0usize;

        for event in &events {
            let result = self
                .producer
                .publish(
                    &event.topic,
                    &event.event_type,
                    event.payload.clone(),
                    &event.partition_key,
                    event.id,
                    event.id,
                )
                .await;

            match result {
                Ok(()) => {
                    OutboxRepository::mark_published(&mut tx, event.id).await?;
                    published_count += 1;
                    tracing::debug!(
                        "Published outbox event: {} [id={}, topic={}]",
                        event.event_type,
                        event.id,
                        event.topic
                    );
                }
                Err(e) => {
                    if event.retry_count >= self.max_retries {
                        OutboxRepository::mark_failed(&mut tx, event.id, &e.to_string()).await?;
                        tracing::error!(
                            "Outbox event failed permanently: {} - {}",
                            event.id,
                            e
                        );
                    } else {
                        OutboxRepository::increment_retry(&mut tx, event.id).await?;
                        tracing::warn!(
                            "Outbox publish failed (retry {}): {} - {}",
                            event.retry_count + 1,
                            event.id,
                            e
                        );
                    }
                }
            }
        }

        tx.commit().await?;

        if published_count > 0 {
            metrics::counter!(
                names::OUTBOX_PUBLISHED,
                "service" => self.service_name.clone(),
            )
            .increment(published_count as u64);
            tracing::info!("Published {} outbox events", published_count);
        }

        Ok(published_count)
    }

    /// Gauge the pending backlog and alert when it breaches the threshold
    async fn probe_depth(&self) {
        match OutboxRepository::pending_depth(&self.db, 60).await {
            Ok(depth) => {
                metrics::gauge!(
                    names::OUTBOX_PENDING_DEPTH,
                    "service" => self.service_name.clone(),
                )
                .set(depth as f64);

                if depth > self.alert_depth {
                    tracing::error!(
                        "Outbox backlog alert: {} pending rows older than 60s (threshold {})",
                        depth,
                        self.alert_depth
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Outbox depth probe failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_starts_pending() {
        let event = OutboxEvent::new(
            "order",
            "abc-123",
            "order.created",
            json!({"order_id": "abc-123"}),
            "orders",
            "order:abc-123",
        );

        assert_eq!(event.status, OutboxStatus::Pending);
        assert_eq!(event.retry_count, 0);
        assert!(event.published_at.is_none());
        assert!(event.error_message.is_none());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&OutboxStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&OutboxStatus::Published).unwrap(),
            "\"published\""
        );
    }
}
