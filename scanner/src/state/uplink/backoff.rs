//! Retry backoff
//!
//! Exponential delay with proportional jitter. Delays never shrink between
//! consecutive attempts of the same task.

use rand::Rng;
use tokio::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the exponential delay added as random jitter, 0.0..=1.0
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `attempt` failed attempts
    pub fn delay_for(
        &self,
        attempt: u32,
        previous: Option<Duration>,
        rng: &mut impl Rng,
    ) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let exponential = self.base.saturating_mul(1u32 << exponent).min(self.max);

        let jitter = self.jitter.clamp(0.0, 1.0);
        let jittered = if jitter > 0.0 {
            exponential.mul_f64(1.0 + rng.gen_range(0.0..=jitter))
        } else {
            exponential
        };

        let delay = jittered.min(self.max);
        match previous {
            Some(previous) => delay.max(previous),
            None => delay,
        }
    }
}
