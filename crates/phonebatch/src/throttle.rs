//! Inter-chunk throttling
//!
//! A fixed pause plus uniform jitter between chunks, so a long run does not
//! hold the shared database at a steady peak.

use std::time::Duration;

use rand::Rng;
use tracing::trace;

/// Randomized pause: `base + uniform[0, jitter)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    base: Duration,
    jitter: Duration,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_millis(100))
    }
}

impl Throttle {
    /// Create a throttle
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    /// A throttle that never sleeps
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Fixed part of the pause
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound (exclusive) of the random part
    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Whether [`pause`](Self::pause) is a no-op
    pub fn is_disabled(&self) -> bool {
        self.base.is_zero() && self.jitter.is_zero()
    }

    /// Draw one pause duration
    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter_nanos = u64::try_from(self.jitter.as_nanos()).unwrap_or(u64::MAX);
        if jitter_nanos == 0 {
            return self.base;
        }
        self.base
            .saturating_add(Duration::from_nanos(rng.gen_range(0..jitter_nanos)))
    }

    /// Sleep for one drawn pause
    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        let delay = self.next_delay(&mut rand::thread_rng());
        trace!("Throttling for {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}
