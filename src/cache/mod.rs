use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::RedisConfig;
use crate::interfaces::cache::PriceCache;

/// Redis-backed latest-price cache.
///
/// Connections are opened per call; every operation is bounded by the
/// configured timeout and any failure degrades to a miss.
pub struct RedisCache {
    client: redis::Client,
    ttl: Duration,
    op_timeout: Duration,
}

impl RedisCache {
    pub fn new(config: &RedisConfig) -> crate::error::Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| crate::error::Error::Cache(e.to_string()))?;
        Ok(RedisCache {
            client,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            op_timeout: Duration::from_millis(config.op_timeout_ms),
        })
    }

    fn price_key(symbol: &str) -> String {
        format!("price:{}", symbol)
    }

    async fn connection(&self) -> Option<redis::aio::Connection> {
        match timeout(self.op_timeout, self.client.get_async_connection()).await {
            Ok(Ok(conn)) => Some(conn),
            Ok(Err(e)) => {
                warn!("Redis connection failed: {}", e);
                None
            }
            Err(_) => {
                warn!("Redis connection timed out");
                None
            }
        }
    }
}

#[async_trait]
impl PriceCache for RedisCache {
    async fn get_price(&self, symbol: &str) -> Option<f64> {
        let mut conn = self.connection().await?;
        let key = Self::price_key(symbol);
        match timeout(self.op_timeout, conn.get::<_, Option<String>>(key)).await {
            Ok(Ok(value)) => value.and_then(|v| v.parse().ok()),
            Ok(Err(e)) => {
                warn!("Redis GET failed for {}: {}", symbol, e);
                None
            }
            Err(_) => {
                warn!("Redis GET timed out for {}", symbol);
                None
            }
        }
    }

    async fn set_price(&self, symbol: &str, price: f64) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        let key = Self::price_key(symbol);
        let ttl = self.ttl.as_secs();
        let mut setex = redis::cmd("SETEX");
        setex.arg(&key).arg(ttl).arg(price.to_string());
        match timeout(self.op_timeout, setex.query_async::<_, ()>(&mut conn)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Redis SETEX failed for {}: {}", symbol, e);
                false
            }
            Err(_) => {
                warn!("Redis SETEX timed out for {}", symbol);
                false
            }
        }
    }

    async fn ping(&self) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        match timeout(
            self.op_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        {
            Ok(Ok(_)) => true,
            _ => false,
        }
    }
}

/// Cache stand-in used when Redis is disabled: every read is a miss.
pub struct NoopCache;

#[async_trait]
impl PriceCache for NoopCache {
    async fn get_price(&self, _symbol: &str) -> Option<f64> {
        None
    }

    async fn set_price(&self, _symbol: &str, _price: f64) -> bool {
        false
    }

    async fn ping(&self) -> bool {
        false
    }
}

/// Select the cache implementation at startup. "Unavailable" is a
/// configuration state, not a per-call exception.
pub fn build(config: &RedisConfig) -> Arc<dyn PriceCache> {
    if !config.enabled {
        debug!("Price cache disabled by configuration");
        return Arc::new(NoopCache);
    }
    match RedisCache::new(config) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Falling back to no-op cache: {}", e);
            Arc::new(NoopCache)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::cache::MockCache;

    #[tokio::test]
    async fn noop_cache_always_misses() {
        let cache = NoopCache;
        assert_eq!(cache.get_price("AAPL").await, None);
        assert!(!cache.set_price("AAPL", 150.0).await);
        assert!(!cache.ping().await);
    }

    #[tokio::test]
    async fn disabled_config_builds_noop() {
        let config = RedisConfig {
            enabled: false,
            ..Default::default()
        };
        let cache = build(&config);
        assert_eq!(cache.get_price("AAPL").await, None);
    }

    // The trait contract itself is fail-open: callers treat any cache as
    // infallible. Exercised here through a mock that simulates outage.
    #[tokio::test]
    async fn callers_see_outage_as_miss() {
        let mut cache = MockCache::new();
        cache.expect_get_price().returning(|_| None);
        cache.expect_set_price().returning(|_, _| false);

        assert_eq!(cache.get_price("MSFT").await, None);
        assert!(!cache.set_price("MSFT", 99.0).await);
    }
}
