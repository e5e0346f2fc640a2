//! Send pacing: spaces direct messages out so a batch never bursts.
//!
//! The delay after a send is `base + jitter + index * step`, plus a fixed
//! penalty once enough messages have gone out, capped at `max_delay_ms`.
//! Failures use a separate cooldown that replaces the normal delay.

use outreach_core::config::ThrottleConfig;
use outreach_core::ServiceErrorKind;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ThrottleController {
    config: ThrottleConfig,
}

impl ThrottleController {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }

    /// Delay to observe after a successful send at batch position `index`.
    pub fn delay_after<R: Rng + ?Sized>(
        &self,
        index: usize,
        successes: usize,
        rng: &mut R,
    ) -> Duration {
        let jitter_fraction = if self.config.jitter_ms == 0 {
            0.0
        } else {
            rng.gen_range(0.0..1.0)
        };
        self.compute(index, successes, jitter_fraction)
    }

    /// Deterministic core of [`delay_after`](Self::delay_after) for a given
    /// jitter draw in `[0, 1)`.
    pub fn compute(&self, index: usize, successes: usize, jitter_fraction: f64) -> Duration {
        let jitter = (self.config.jitter_ms as f64 * jitter_fraction.clamp(0.0, 1.0)) as u64;
        let base = self.config.base_delay_ms.saturating_add(jitter);
        let progressive = self.config.progressive_step_ms.saturating_mul(index as u64);
        let safety = if self.config.safety_threshold > 0 && successes >= self.config.safety_threshold
        {
            self.config.safety_penalty_ms
        } else {
            0
        };

        let total = base
            .saturating_add(progressive)
            .saturating_add(safety)
            .min(self.config.max_delay_ms);
        Duration::from_millis(total)
    }

    /// Cooldown after a failed target, longer when the platform signalled
    /// rate limiting.
    pub fn failure_cooldown(&self, kind: ServiceErrorKind) -> Duration {
        match kind {
            ServiceErrorKind::RateLimited => Duration::from_millis(self.config.rate_limit_cooldown_ms),
            _ => Duration::from_millis(self.config.failure_cooldown_ms),
        }
    }
}

impl Default for ThrottleController {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}
