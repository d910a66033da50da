//! Redis cache client
//!
//! JSON values with TTL throughout. Holds idempotency marks, reservation
//! outcome mappings, product/order read-throughs and workflow tracking
//! timestamps.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result};

/// Shared async Redis handle
///
/// `ConnectionManager` multiplexes one connection and reconnects on failure,
/// so cloning this handle is cheap and task-safe.
#[derive(Clone)]
pub struct Cache {
    manager: ConnectionManager,
}

impl Cache {
    /// Connect to Redis and verify with a PING
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| Error::Cache(e.to_string()))?;
        let mut manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<String>(&mut manager)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;

        tracing::info!("Redis connected");
        Ok(Self { manager })
    }

    /// Get a JSON value
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Set a JSON value with TTL
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        let raw = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, raw, ttl_seconds).await?;
        Ok(())
    }

    /// Delete a key
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    /// Check key existence
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let n: i64 = conn.exists(key).await?;
        Ok(n > 0)
    }

    /// Set a marker key with TTL, returning false when it already existed
    pub async fn set_nx(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let mut conn = self.manager.clone();
        let created: bool = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();
        Ok(created)
    }
}

/// Cache key patterns
pub struct CacheKeys;

impl CacheKeys {
    pub fn user(user_id: Uuid) -> String {
        format!("user:{}", user_id)
    }

    pub fn product(product_id: Uuid) -> String {
        format!("product:{}", product_id)
    }

    pub fn product_list(category: Option<&str>) -> String {
        format!("products:list:{}", category.unwrap_or("all"))
    }

    pub fn order(order_id: Uuid) -> String {
        format!("order:{}", order_id)
    }

    pub fn reserve_idempotency(key: &str) -> String {
        format!("reserve:idempotency:{}", key)
    }

    pub fn processed_event(consumer_group: &str, event_id: Uuid) -> String {
        format!("processed:{}:{}", consumer_group, event_id)
    }

    pub fn workflow_started(order_id: Uuid) -> String {
        format!("workflow:order:{}", order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_patterns() {
        let id = Uuid::nil();
        assert_eq!(CacheKeys::product(id), format!("product:{}", id));
        assert_eq!(CacheKeys::product_list(None), "products:list:all");
        assert_eq!(CacheKeys::product_list(Some("tools")), "products:list:tools");
        assert_eq!(
            CacheKeys::processed_event("inventory-service", id),
            format!("processed:inventory-service:{}", id)
        );
        assert_eq!(CacheKeys::reserve_idempotency("k1"), "reserve:idempotency:k1");
    }
}
