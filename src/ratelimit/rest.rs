use async_trait::async_trait;
use log::debug;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{ json, Value };
use url::Url;

use super::{ INCREMENT_SCRIPT, RateDecision, RateLimitError, RateLimiter, RatePolicy };

/// Fixed-window limiter for Redis-over-HTTP stores (one JSON command per request).
pub struct RestRateLimiter {
    http: HttpClient,
    url: Url,
    token: String,
    key_prefix: String,
    policy: RatePolicy,
}

#[derive(Deserialize)]
struct RestReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl RestReply {
    fn count(self) -> Result<u32, RateLimitError> {
        if let Some(error) = self.error {
            return Err(RateLimitError::Store(error));
        }
        let count = match self.result {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        };
        count
            .map(|c| u32::try_from(c).unwrap_or(u32::MAX))
            .ok_or_else(|| RateLimitError::Store("counter reply carried no integer".into()))
    }
}

impl RestRateLimiter {
    pub fn new(
        url: Url,
        token: &str,
        key_prefix: String,
        policy: RatePolicy
    ) -> Result<Self, RateLimitError> {
        Ok(Self {
            http: HttpClient::builder().build()?,
            url,
            token: token.to_string(),
            key_prefix,
            policy,
        })
    }

    fn command(&self, key: &str) -> Value {
        json!(["EVAL", INCREMENT_SCRIPT, "1", key, self.policy.window.as_secs().to_string()])
    }
}

#[async_trait]
impl RateLimiter for RestRateLimiter {
    async fn check(&self, client: &str) -> Result<RateDecision, RateLimitError> {
        let key = format!("{}{}", self.key_prefix, client);
        let reply = self.http
            .post(self.url.clone())
            .bearer_auth(&self.token)
            .json(&self.command(&key))
            .send()
            .await?
            .error_for_status()?
            .json::<RestReply>()
            .await?;

        let count = reply.count()?;
        debug!("Counter {} is at {}", key, count);
        Ok(RateDecision::from_count(count, self.policy.max_requests))
    }

    fn backend(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_evaluates_the_shared_script() {
        let limiter = RestRateLimiter::new(
            Url::parse("https://store.example.com").unwrap(),
            "token",
            "ratelimit:".into(),
            RatePolicy::default()
        ).unwrap();
        let cmd = limiter.command("ratelimit:1.2.3.4");
        assert_eq!(cmd[0], "EVAL");
        assert_eq!(cmd[2], "1");
        assert_eq!(cmd[3], "ratelimit:1.2.3.4");
        assert_eq!(cmd[4], "60");
    }

    #[test]
    fn replies_decode_to_counts() {
        let ok: RestReply = serde_json::from_str(r#"{"result":3}"#).unwrap();
        assert_eq!(ok.count().unwrap(), 3);
        let err: RestReply = serde_json::from_str(r#"{"error":"WRONGPASS"}"#).unwrap();
        assert!(matches!(err.count(), Err(RateLimitError::Store(_))));
        let empty: RestReply = serde_json::from_str(r#"{"result":null}"#).unwrap();
        assert!(empty.count().is_err());
    }
}
