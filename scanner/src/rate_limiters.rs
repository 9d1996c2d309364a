use std::sync::Arc;
use tokio::time::Duration;

use leaky_bucket::RateLimiter;

/// Optional cap on collector requests per second
#[derive(Clone, Default)]
pub struct UplinkRateLimiter {
    requests: Option<Arc<RateLimiter>>,
}

impl UplinkRateLimiter {
    pub fn new(max_per_sec: usize, refill_interval_ms: u64) -> Self {
        let max_per_sec = max_per_sec.max(1);
        let refill_interval_ms = refill_interval_ms.max(1);
        // Spread the per-second budget over the refill ticks
        let refill = (max_per_sec as u64 * refill_interval_ms / 1000).max(1) as usize;

        let requests = RateLimiter::builder()
            .initial(max_per_sec)
            .interval(Duration::from_millis(refill_interval_ms))
            .max(max_per_sec)
            .refill(refill)
            .build();

        Self {
            requests: Some(Arc::new(requests)),
        }
    }

    pub fn unlimited() -> Self {
        Self { requests: None }
    }

    pub async fn acquire_one(&self) {
        if let Some(requests) = &self.requests {
            requests.acquire_one().await;
        }
    }

    pub fn get_status(&self) -> String {
        match &self.requests {
            Some(requests) => format!("requests: {}/{}", requests.balance(), requests.max()),
            None => "requests: unlimited".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unlimited_never_waits() {
        let limiter = UplinkRateLimiter::unlimited();
        for _ in 0..1_000 {
            limiter.acquire_one().await;
        }
        assert_eq!(limiter.get_status(), "requests: unlimited");
    }

    #[tokio::test]
    async fn test_initial_budget_is_available() {
        let limiter = UplinkRateLimiter::new(5, 100);
        let started = std::time::Instant::now();
        for _ in 0..5 {
            limiter.acquire_one().await;
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(limiter.get_status().ends_with("/5"));
    }
}
