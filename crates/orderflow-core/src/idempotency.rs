//! Processed-event tracking
//!
//! Records `(consumer_group, event_id)` marks in Redis with a 24h TTL so a
//! redelivered event short-circuits before its handler runs. The mark is
//! written before the offset commit; a crash between the two causes at most
//! one redelivery, which the mark absorbs.

use uuid::Uuid;

use crate::cache::{Cache, CacheKeys};
use crate::Result;

const PROCESSED_TTL_SECONDS: u64 = 86_400;

/// Idempotency store scoped to one consumer group
#[derive(Clone)]
pub struct IdempotencyStore {
    cache: Cache,
    consumer_group: String,
}

impl IdempotencyStore {
    pub fn new(cache: Cache, consumer_group: &str) -> Self {
        Self {
            cache,
            consumer_group: consumer_group.to_string(),
        }
    }

    /// Check whether an event was already processed
    pub async fn is_processed(&self, event_id: Uuid) -> Result<bool> {
        self.cache
            .exists(&CacheKeys::processed_event(&self.consumer_group, event_id))
            .await
    }

    /// Mark an event as processed
    pub async fn mark_processed(&self, event_id: Uuid) -> Result<()> {
        let key = CacheKeys::processed_event(&self.consumer_group, event_id);
        self.cache.set_nx(&key, PROCESSED_TTL_SECONDS).await?;
        Ok(())
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }
}
