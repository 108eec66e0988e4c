//! Randomised pauses between detail-page visits.
//!
//! Keeps the request rhythm irregular so consecutive visits never land on
//! a fixed interval.

use std::time::Duration;

use crate::config::HarvestConfig;

/// Sleeps a uniformly random duration in `[min, max]` between visits.
#[derive(Debug, Clone, Copy)]
pub struct VisitPacer {
    min: Duration,
    max: Duration,
}

impl VisitPacer {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(config.visit_delay_min, config.visit_delay_max)
    }

    /// Disabled pacer: every pause is zero.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Next pause length.
    pub fn next_delay(&self) -> Duration {
        let spread = (self.max - self.min).as_millis() as u64;
        self.min + Duration::from_millis(rand_spread_ms(spread))
    }

    pub async fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        tracing::trace!(delay_ms = %delay.as_millis(), "Pausing before next visit");
        tokio::time::sleep(delay).await;
    }
}

// xorshift64 seeded from the clock; good enough for pacing, not for crypto.
fn rand_spread_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
        | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % (max_ms + 1)
}
