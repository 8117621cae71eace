pub mod memory;
pub mod redis;
pub mod rest;

use async_trait::async_trait;
use axum::http::HeaderMap;
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use crate::cli::Args;

/// Key used when a request carries no forwarding headers.
pub const DIRECT_CLIENT: &str = "unknown";

/// Atomically increments the hit counter in `KEYS[1]` and starts its expiry
/// on the first hit of a window. Shared by every external store.
pub const INCREMENT_SCRIPT: &str = r"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
";

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis counter store failed: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("rest counter store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("counter store replied unexpectedly: {0}")]
    Store(String),
    #[error("invalid counter store configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Hits seen in the current window, including this one when it was counted.
    pub count: u32,
    pub limit: u32,
}

impl RateDecision {
    pub(crate) fn from_count(count: u32, limit: u32) -> Self {
        Self { allowed: count <= limit, count, limit }
    }
}

/// Increment-and-check of one caller's submissions within a window.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, client: &str) -> Result<RateDecision, RateLimitError>;

    fn backend(&self) -> &'static str;
}

/// Caller identity: first `X-Forwarded-For` hop, then `X-Real-IP`, then a fixed marker.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DIRECT_CLIENT)
        .to_string()
}

pub async fn create_rate_limiter(
    args: &Args
) -> Result<Arc<dyn RateLimiter>, Box<dyn Error + Send + Sync>> {
    let policy = RatePolicy {
        max_requests: args.rate_limit_max,
        window: Duration::from_secs(args.rate_limit_window_secs.max(1)),
    };

    let Some(raw_url) = args.store_url() else {
        warn!(
            "Rate limiting uses the in-process table; counts are not shared between processes."
        );
        return Ok(Arc::new(memory::MemoryRateLimiter::new(policy)));
    };

    let url = Url::parse(raw_url).map_err(|e|
        RateLimitError::Config(format!("Invalid RATE_LIMIT_STORE_URL '{}': {}", raw_url, e))
    )?;
    let prefix = args.rate_limit_key_prefix.clone();

    match url.scheme() {
        "redis" => {
            let limiter = self::redis::RedisRateLimiter::connect(url, args.store_token(), prefix, policy).await?;
            info!("Rate limiting uses the Redis counter store");
            Ok(Arc::new(limiter))
        }
        "http" | "https" => {
            let token = args.store_token().ok_or_else(||
                RateLimitError::Config("RATE_LIMIT_STORE_TOKEN is required for REST stores".into())
            )?;
            let limiter = self::rest::RestRateLimiter::new(url, token, prefix, policy)?;
            info!("Rate limiting uses the REST counter store");
            Ok(Arc::new(limiter))
        }
        other =>
            Err(
                Box::new(
                    RateLimitError::Config(format!("Unsupported counter store scheme: {}", other))
                )
            ),
    }
}
