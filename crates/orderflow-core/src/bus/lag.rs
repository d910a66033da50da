//! Consumer lag monitoring
//!
//! Polls the high watermark for every assigned partition and publishes the
//! distance to the committed position as a gauge. Lag growth is the earliest
//! signal of a slow or stuck consumer.

use rdkafka::consumer::Consumer;
use rdkafka::TopicPartitionList;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::bus::consumer::EventConsumer;
use crate::metrics::names;

const WATERMARK_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodic lag probe for one consumer group
pub struct LagMonitor {
    consumer: Arc<EventConsumer>,
    interval: Duration,
}

impl LagMonitor {
    pub fn new(consumer: Arc<EventConsumer>) -> Self {
        Self {
            consumer,
            interval: Duration::from_secs(30),
        }
    }

    /// Probe until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Lag monitor for {} stopping", self.consumer.group_id());
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.probe() {
                        tracing::warn!("Lag probe failed for {}: {}", self.consumer.group_id(), e);
                    }
                }
            }
        }
    }

    fn probe(&self) -> crate::Result<()> {
        let inner = self.consumer.inner();
        let assignment: TopicPartitionList = inner
            .assignment()
            .map_err(|e| crate::Error::Bus(e.to_string()))?;

        let positions = inner
            .position()
            .map_err(|e| crate::Error::Bus(e.to_string()))?;

        for element in assignment.elements() {
            let (_, high) = inner
                .fetch_watermarks(element.topic(), element.partition(), WATERMARK_TIMEOUT)
                .map_err(|e| crate::Error::Bus(e.to_string()))?;

            let position = positions
                .find_partition(element.topic(), element.partition())
                .and_then(|p| p.offset().to_raw())
                .unwrap_or(0);

            let lag = (high - position).max(0);

            metrics::gauge!(
                names::CONSUMER_LAG,
                "group" => self.consumer.group_id().to_string(),
                "topic" => element.topic().to_string(),
                "partition" => element.partition().to_string(),
            )
            .set(lag as f64);
        }

        Ok(())
    }
}
