//! Reliable Kafka consumer
//!
//! One consumer per subscription group. Offsets are committed manually only
//! after the handler completed and the idempotency mark was written; handler
//! failures retry with exponential backoff and fall through to the
//! dead-letter topic. A handler failure never crashes the consumer.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::bus::envelope::{EventEnvelope, EventKind};
use crate::bus::producer::EventProducer;
use crate::config::{KafkaConfig, OpsConfig};
use crate::idempotency::IdempotencyStore;
use crate::metrics::names;
use crate::{Error, Result};

/// Handler for one event kind
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()>;
}

/// What became of a dispatched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Handler ran to completion; mark processed and commit
    Handled,
    /// Unknown kind or no handler; commit without marking
    Skipped,
    /// Retries exhausted, envelope parked in the DLQ; commit without marking
    DeadLettered,
}

/// Kafka consumer with idempotency, retry and dead-letter handling
pub struct EventConsumer {
    consumer: StreamConsumer,
    group_id: String,
    service_name: String,
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
    idempotency: IdempotencyStore,
    producer: EventProducer,
    max_retries: u32,
    retry_backoff: Duration,
    handler_timeout: Duration,
}

impl EventConsumer {
    pub fn new(
        kafka: &KafkaConfig,
        ops: &OpsConfig,
        topics: &[&str],
        group_id: &str,
        service_name: &str,
        idempotency: IdempotencyStore,
        producer: EventProducer,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "10000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| Error::Bus(format!("Failed to create consumer: {}", e)))?;

        consumer
            .subscribe(topics)
            .map_err(|e| Error::Bus(format!("Failed to subscribe: {}", e)))?;

        tracing::info!(
            "Kafka consumer started: group={}, topics={:?}",
            group_id,
            topics
        );

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
            service_name: service_name.to_string(),
            handlers: HashMap::new(),
            idempotency,
            producer,
            max_retries: ops.max_retries,
            retry_backoff: Duration::from_millis(ops.retry_backoff_ms),
            handler_timeout: Duration::from_secs(ops.handler_timeout_seconds),
        })
    }

    /// Register a handler for an event kind
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        tracing::info!("Registered handler for {}", kind.as_str());
        self.handlers.insert(kind, handler);
    }

    /// Consume until shutdown is signalled
    ///
    /// The fetch stops immediately on shutdown; the in-flight message drains
    /// through its normal retry path first.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Consumer {} stopping", self.group_id);
                    break;
                }
                received = self.consumer.recv() => {
                    match received {
                        Ok(message) => self.handle_message(&message).await,
                        Err(e) => {
                            tracing::error!("Consumer {} fetch error: {}", self.group_id, e);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_message(&self, message: &BorrowedMessage<'_>) {
        let topic = message.topic().to_string();

        let envelope = match message
            .payload()
            .ok_or_else(|| Error::bus("Message has no payload"))
            .and_then(|p| serde_json::from_slice::<EventEnvelope>(p).map_err(Error::from))
        {
            Ok(envelope) => envelope,
            Err(e) => {
                // Poison message: count it and move on
                tracing::error!("Undecodable message on {}: {}", topic, e);
                metrics::counter!(
                    names::DEAD_LETTER_EVENTS,
                    "service" => self.service_name.clone(),
                    "topic" => topic,
                    "reason" => "deserialization_failed",
                )
                .increment(1);
                self.commit(message);
                return;
            }
        };

        tracing::debug!(
            "Received {} [event_id={}, correlation_id={}, partition={}]",
            envelope.event_type,
            envelope.event_id,
            envelope.correlation_id,
            message.partition()
        );

        // Idempotency check
        match self.idempotency.is_processed(envelope.event_id).await {
            Ok(true) => {
                tracing::info!("Skipping duplicate event: {}", envelope.event_id);
                metrics::counter!(
                    names::DUPLICATE_EVENTS,
                    "service" => self.service_name.clone(),
                    "event_type" => envelope.event_type.clone(),
                )
                .increment(1);
                self.commit(message);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                // Leave the offset uncommitted so the message redelivers
                tracing::error!("Idempotency lookup failed: {}", e);
                return;
            }
        }

        let started = Instant::now();
        let disposition = self.dispatch_with_retry(&topic, &envelope).await;
        metrics::histogram!(
            names::EVENT_PROCESSING_DURATION,
            "service" => self.service_name.clone(),
            "event_type" => envelope.event_type.clone(),
        )
        .record(started.elapsed().as_secs_f64());

        if disposition == Disposition::Handled {
            if let Err(e) = self.idempotency.mark_processed(envelope.event_id).await {
                tracing::error!("Failed to mark event processed: {}", e);
                // Without the mark a redelivery would re-run the handler;
                // leave the offset uncommitted and let retry deliver again.
                return;
            }
        }

        self.commit(message);
    }

    async fn dispatch_with_retry(&self, topic: &str, envelope: &EventEnvelope) -> Disposition {
        let kind = envelope.kind();

        if kind == EventKind::Unknown {
            tracing::warn!("Skipping unknown event type: {}", envelope.event_type);
            return Disposition::Skipped;
        }

        let Some(handler) = self.handlers.get(&kind) else {
            tracing::warn!("No handler for event type: {}", envelope.event_type);
            return Disposition::Skipped;
        };

        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            let attempt_result =
                tokio::time::timeout(self.handler_timeout, handler.handle(envelope)).await;

            match attempt_result {
                Ok(Ok(())) => return Disposition::Handled,
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!("handler exceeded {:?} deadline", self.handler_timeout)
                }
            }

            if attempt < self.max_retries {
                let base = self.retry_backoff * 2u32.pow(attempt);
                let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
                let wait = base + Duration::from_millis(jitter);
                tracing::warn!(
                    "Handler for {} failed (attempt {}/{}), retrying in {:?}: {}",
                    envelope.event_type,
                    attempt + 1,
                    self.max_retries + 1,
                    wait,
                    last_error
                );
                tokio::time::sleep(wait).await;
            }
        }

        tracing::error!(
            "Handler for {} failed after {} attempts: {}",
            envelope.event_type,
            self.max_retries + 1,
            last_error
        );

        let mut failed = envelope.clone();
        failed.retry_count = self.max_retries as i32;
        if let Err(e) = self
            .producer
            .send_to_dead_letter(topic, &failed, "handler_failed", &last_error)
            .await
        {
            tracing::error!("DLQ divert failed for {}: {}", envelope.event_id, e);
        }

        // The failure is parked in the DLQ; the offset moves on without an
        // idempotency mark so a manual replay is not short-circuited
        Disposition::DeadLettered
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!(
                "Failed to commit offset for {}@{} (message may be redelivered): {}",
                message.topic(),
                message.offset(),
                e
            );
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub(crate) fn inner(&self) -> &StreamConsumer {
        &self.consumer
    }
}
