use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;

use super::{ RateDecision, RateLimitError, RateLimiter, RatePolicy };

/// Callers tracked before idle entries are swept.
const SWEEP_THRESHOLD: usize = 1024;

/// Rolling-window limiter over per-caller timestamps.
///
/// Only hits that were let through are recorded. The table lives in this
/// process, so several replicas each enforce their own limit.
pub struct MemoryRateLimiter {
    policy: RatePolicy,
    hits: Mutex<HashMap<String, Vec<Instant>>>,
}

impl MemoryRateLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let window_start = now.checked_sub(self.policy.window);
        let in_window = |t: &Instant| window_start.map_or(true, |start| *t > start);
        let limit = self.policy.max_requests;

        let mut hits = self.hits.lock().await;
        let decision = {
            let recent = hits.entry(client.to_string()).or_default();
            recent.retain(|t| in_window(t));

            if recent.len() >= limit as usize {
                RateDecision { allowed: false, count: recent.len() as u32 + 1, limit }
            } else {
                recent.push(now);
                RateDecision::from_count(recent.len() as u32, limit)
            }
        };

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, times| times.last().map_or(false, |t| in_window(t)));
        }

        decision
    }

    pub async fn tracked_clients(&self) -> usize {
        self.hits.lock().await.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, client: &str) -> Result<RateDecision, RateLimitError> {
        Ok(self.check_at(client, Instant::now()).await)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter() -> MemoryRateLimiter {
        MemoryRateLimiter::new(RatePolicy::default())
    }

    #[tokio::test]
    async fn sixth_hit_in_window_is_rejected() {
        let limiter = limiter();
        let t0 = Instant::now();
        for i in 0..5 {
            let d = limiter.check_at("1.2.3.4", t0 + Duration::from_secs(i)).await;
            assert!(d.allowed, "hit {} should pass", i + 1);
        }
        let sixth = limiter.check_at("1.2.3.4", t0 + Duration::from_secs(10)).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.count, 6);
    }

    #[tokio::test]
    async fn window_rolls_past_the_first_hit() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at("a", t0).await.allowed);
        }
        assert!(!limiter.check_at("a", t0 + Duration::from_secs(59)).await.allowed);
        assert!(limiter.check_at("a", t0 + Duration::from_secs(61)).await.allowed);
    }

    #[tokio::test]
    async fn rejected_hits_do_not_extend_the_window() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            limiter.check_at("a", t0).await;
        }
        for s in 1..30 {
            assert!(!limiter.check_at("a", t0 + Duration::from_secs(s)).await.allowed);
        }
        assert!(limiter.check_at("a", t0 + Duration::from_secs(60) + Duration::from_millis(1)).await.allowed);
    }

    #[tokio::test]
    async fn callers_are_counted_separately() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            limiter.check_at("a", t0).await;
        }
        assert!(!limiter.check_at("a", t0).await.allowed);
        assert!(limiter.check_at("b", t0).await.allowed);
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[tokio::test]
    async fn idle_callers_are_swept() {
        let limiter = limiter();
        let t0 = Instant::now();
        for i in 0..=SWEEP_THRESHOLD {
            limiter.check_at(&format!("old-{}", i), t0).await;
        }
        limiter.check_at("fresh", t0 + Duration::from_secs(120)).await;
        assert_eq!(limiter.tracked_clients().await, 1);
    }
}
