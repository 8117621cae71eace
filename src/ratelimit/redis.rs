use async_trait::async_trait;
use log::debug;
use redis::{ Client, Script };
use redis::aio::MultiplexedConnection;
use url::Url;

use super::{ INCREMENT_SCRIPT, RateDecision, RateLimitError, RateLimiter, RatePolicy };

/// Fixed-window limiter backed by a Redis counter per caller.
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    script: Script,
    key_prefix: String,
    policy: RatePolicy,
}

/// Places the store token in the URL's password slot unless one is already there.
pub(crate) fn with_password(mut url: Url, token: Option<&str>) -> Result<Url, RateLimitError> {
    if let Some(token) = token {
        if url.password().is_none() {
            url.set_password(Some(token)).map_err(|_|
                RateLimitError::Config("Counter store URL cannot carry a password".into())
            )?;
        }
    }
    Ok(url)
}

impl RedisRateLimiter {
    pub async fn connect(
        url: Url,
        token: Option<&str>,
        key_prefix: String,
        policy: RatePolicy
    ) -> Result<Self, RateLimitError> {
        let url = with_password(url, token)?;
        let client = Client::open(url.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            script: Script::new(INCREMENT_SCRIPT),
            key_prefix,
            policy,
        })
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, client: &str) -> Result<RateDecision, RateLimitError> {
        let key = format!("{}{}", self.key_prefix, client);
        let mut conn = self.conn.clone();
        let count: i64 = self.script
            .key(&key)
            .arg(self.policy.window.as_secs())
            .invoke_async(&mut conn).await?;
        debug!("Counter {} is at {}", key, count);

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        Ok(RateDecision::from_count(count, self.policy.max_requests))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
