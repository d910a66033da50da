//! Reliable Kafka producer
//!
//! Idempotent producer (enable.idempotence=true, acks=all), lz4 compression,
//! short linger for batching. Transient publish failures retry with
//! exponential backoff; permanent failures divert the envelope to the
//! dead-letter topic with the original topic and reason preserved.

use chrono::Utc;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use crate::bus::envelope::{EventEnvelope, PartitionKey, Topics};
use crate::config::{KafkaConfig, OpsConfig};
use crate::metrics::names;
use crate::{Error, Result};

/// Kafka producer shared by one service
///
/// Cheap to clone; rdkafka's `FutureProducer` is internally thread-safe and
/// batched. One instance per service.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    service_name: String,
    max_retries: u32,
    retry_backoff: Duration,
    send_timeout: Duration,
}

impl EventProducer {
    pub fn new(kafka: &KafkaConfig, ops: &OpsConfig, service_name: &str) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.bootstrap_servers)
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("compression.type", "lz4")
            .set("linger.ms", "5")
            .set("batch.size", "16384")
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| Error::Bus(format!("Failed to create producer: {}", e)))?;

        tracing::info!("Kafka producer started for {}", service_name);

        Ok(Self {
            producer,
            service_name: service_name.to_string(),
            max_retries: ops.max_retries,
            retry_backoff: Duration::from_millis(ops.retry_backoff_ms),
            send_timeout: Duration::from_secs(5),
        })
    }

    /// Publish an event with reliability guarantees
    ///
    /// Wraps the payload in the standard envelope. `event_id` is supplied by
    /// the caller (the outbox row id) so redeliveries dedupe downstream.
    pub async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        payload: Value,
        partition_key: &str,
        event_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<()> {
        let mut envelope = EventEnvelope::new(
            event_id,
            event_type,
            correlation_id,
            &self.service_name,
            payload,
        );

        for attempt in 0..=self.max_retries {
            envelope.retry_count = attempt as i32;
            match self.send_envelope(topic, partition_key, &envelope).await {
                Ok(()) => {
                    tracing::debug!(
                        "Published {} to {} [key={}, correlation_id={}]",
                        event_type,
                        topic,
                        partition_key,
                        correlation_id
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    let wait = self.retry_backoff * 2u32.pow(attempt);
                    tracing::warn!(
                        "Publish failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.max_retries + 1,
                        wait,
                        e
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    self.send_to_dead_letter(topic, &envelope, "publish_failed", &e.to_string())
                        .await?;
                    return Err(Error::Bus(format!(
                        "Publish to {} failed permanently: {}",
                        topic, e
                    )));
                }
            }
        }

        unreachable!("retry loop always returns")
    }

    async fn send_envelope(
        &self,
        topic: &str,
        partition_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        let payload = serde_json::to_vec(envelope)?;
        let correlation = envelope.correlation_id.to_string();

        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "correlation_id",
                value: Some(correlation.as_str()),
            })
            .insert(Header {
                key: "event_type",
                value: Some(envelope.event_type.as_str()),
            })
            .insert(Header {
                key: "source",
                value: Some(self.service_name.as_str()),
            });

        let record = FutureRecord::to(topic)
            .payload(&payload)
            .key(partition_key)
            .headers(headers);

        self.producer
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map_err(|(e, _)| Error::Bus(e.to_string()))?;

        Ok(())
    }

    /// Divert a permanently failed envelope to the dead-letter topic
    ///
    /// `reason` is a short label for the dead-letter counter; `detail` is the
    /// full failure description preserved in the DLQ payload.
    pub async fn send_to_dead_letter(
        &self,
        original_topic: &str,
        envelope: &EventEnvelope,
        reason: &'static str,
        detail: &str,
    ) -> Result<()> {
        let dlq_payload = json!({
            "original_topic": original_topic,
            "original_event": envelope,
            "error_reason": detail,
            "failed_at": Utc::now(),
        });

        let dlq_envelope = EventEnvelope::new(
            Uuid::new_v4(),
            &envelope.event_type,
            envelope.correlation_id,
            &self.service_name,
            dlq_payload,
        );

        let key = PartitionKey::dead_letter(envelope.event_id);
        let result = self
            .send_envelope(Topics::DEAD_LETTER, &key, &dlq_envelope)
            .await;

        match result {
            Ok(()) => {
                metrics::counter!(
                    names::DEAD_LETTER_EVENTS,
                    "service" => self.service_name.clone(),
                    "topic" => original_topic.to_string(),
                    "reason" => reason,
                )
                .increment(1);
                tracing::error!(
                    "Message sent to DLQ: {} [event_id={}, reason={}]",
                    envelope.event_type,
                    envelope.event_id,
                    detail
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to send to DLQ: {}", e);
                Err(e)
            }
        }
    }

    /// Flush unsent batches, used during graceful shutdown
    pub fn flush(&self, timeout: Duration) {
        if let Err(e) = self.producer.flush(Timeout::After(timeout)) {
            tracing::warn!("Producer flush failed: {}", e);
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
