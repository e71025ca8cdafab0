use anyhow::Result;
use moka::future::Cache;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const PENDING_INTENT_KEY: &str = "pending_payment_intent";
pub const SESSION_TOKEN_KEY: &str = "session:token";
pub const SESSION_LOGIN_TYPE_KEY: &str = "session:login_type";
pub const PRICES_CACHE_KEY: &str = "prices:all";

pub fn receipt_key(tx_hash: &str) -> String {
    format!("evm_payment:{}", tx_hash)
}

/// Service-side stand-in for the storefront's local key-value storage:
/// session values, pending mobile payment intents and payment receipts,
/// plus short-TTL caches and counters. Redis persists across restarts;
/// the moka layer keeps hot reads off the wire and carries the whole load
/// when Redis is unreachable.
pub struct StorageService {
    redis: Option<redis::aio::ConnectionManager>,
    memory: Arc<Cache<String, String>>,
}

impl StorageService {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let redis = match redis::Client::open(redis_url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    tracing::info!("Redis connected successfully");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed: {}, using memory storage only", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Redis client creation failed: {}, using memory storage only", e);
                None
            }
        };

        // Memory entries are short-lived; Redis TTLs are authoritative.
        let memory = Arc::new(
            Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(60))
                .build(),
        );

        Ok(Self { redis, memory })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(cached) = self.memory.get(key).await {
            if let Ok(value) = serde_json::from_str(&cached) {
                tracing::debug!("Memory hit for key: {}", key);
                return Ok(Some(value));
            }
        }

        if let Some(mut redis) = self.redis.clone() {
            match redis.get::<_, Option<String>>(key).await {
                Ok(Some(stored)) => {
                    if let Ok(value) = serde_json::from_str(&stored) {
                        self.memory.insert(key.to_string(), stored).await;
                        tracing::debug!("Redis hit for key: {}", key);
                        return Ok(Some(value));
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Redis get error: {}", e),
            }
        }

        tracing::debug!("Storage miss for key: {}", key);
        Ok(None)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let serialized = serde_json::to_string(value)?;

        self.memory.insert(key.to_string(), serialized.clone()).await;

        if let Some(mut redis) = self.redis.clone() {
            if let Err(e) = redis.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
                tracing::warn!("Redis set error: {}", e);
            } else {
                tracing::debug!("Stored key: {} with TTL: {}s", key, ttl_secs);
            }
        }

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.memory.invalidate(key).await;

        if let Some(mut redis) = self.redis.clone() {
            if let Err(e) = redis.del::<_, ()>(key).await {
                tracing::warn!("Redis del error: {}", e);
            }
        }

        Ok(())
    }

    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        if let Some(mut redis) = self.redis.clone() {
            match redis.incr(key, delta).await {
                Ok(value) => Ok(value),
                Err(e) => {
                    tracing::warn!("Redis increment error: {}", e);
                    Ok(delta)
                }
            }
        } else {
            Ok(delta)
        }
    }

    pub async fn ping(&self) -> Result<bool> {
        if let Some(mut redis) = self.redis.clone() {
            match redis::cmd("PING").query_async::<_, String>(&mut redis).await {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            }
        } else {
            Ok(false)
        }
    }
}
