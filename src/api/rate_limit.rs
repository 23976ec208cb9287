use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use tokio::time::timeout;
use tracing::warn;

use crate::api::rest::ApiState;
use crate::config::{RateLimitConfig, RedisConfig};
use crate::error::{Error, Result};

/// Sliding-window rate limiter backed by a Redis sorted set per client.
///
/// Redis being slow or down must never block the primary path: every call
/// is bounded by a short timeout and any failure admits the request.
pub struct RateLimiter {
    client: Option<redis::Client>,
    max_requests: u64,
    window: Duration,
    op_timeout: Duration,
}

impl RateLimiter {
    pub fn new(redis: &RedisConfig, config: &RateLimitConfig) -> Self {
        let client = if config.enabled {
            match redis::Client::open(redis.url.as_str()) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Rate limiter disabled, Redis unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        RateLimiter {
            client,
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_secs),
            op_timeout: Duration::from_millis(redis.op_timeout_ms),
        }
    }

    pub fn disabled() -> Self {
        RateLimiter {
            client: None,
            max_requests: u64::MAX,
            window: Duration::from_secs(60),
            op_timeout: Duration::from_millis(1000),
        }
    }

    /// Err(RateLimitExceeded) when the client is over its window allowance;
    /// Ok on anything else, including Redis trouble.
    pub async fn check(&self, key: &str) -> Result<()> {
        let Some(client) = &self.client else {
            return Ok(());
        };

        match timeout(self.op_timeout, self.count_in_window(client, key)).await {
            Ok(Ok(count)) if count >= self.max_requests => {
                warn!("Rate limit exceeded for key: {}", key);
                Err(Error::RateLimitExceeded)
            }
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                warn!("Rate limit check failed, allowing request: {}", e);
                Ok(())
            }
            Err(_) => {
                warn!("Rate limit check timed out, allowing request");
                Ok(())
            }
        }
    }

    /// Trim entries older than the window, count what remains, then record
    /// this request.
    async fn count_in_window(&self, client: &redis::Client, key: &str) -> Result<u64> {
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;

        let now_us = Utc::now().timestamp_micros();
        let window_start = now_us - self.window.as_micros() as i64;
        let window_secs = self.window.as_secs();

        let mut pipe = redis::pipe();
        pipe.cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg(0)
            .arg(window_start)
            .ignore();
        pipe.cmd("ZCARD").arg(key);
        pipe.cmd("ZADD").arg(key).arg(now_us).arg(now_us).ignore();
        pipe.cmd("EXPIRE").arg(key).arg(window_secs).ignore();

        let (count,): (u64,) = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Cache(e.to_string()))?;

        Ok(count)
    }
}

/// Per-request middleware over the API routes. Health, readiness, and
/// metrics live on the unlimited root router.
pub async fn limit_requests(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    state
        .rate_limiter
        .check(&format!("rate_limit:{}", client))
        .await?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_limiter_admits_everything() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1_000 {
            assert!(limiter.check("rate_limit:10.0.0.1").await.is_ok());
        }
    }

    #[tokio::test]
    async fn config_disabled_means_no_client() {
        let limiter = RateLimiter::new(
            &RedisConfig::default(),
            &RateLimitConfig {
                enabled: false,
                ..Default::default()
            },
        );
        assert!(limiter.check("rate_limit:10.0.0.2").await.is_ok());
    }
}
