//! Delay policy between a failed attempt and its re-enqueue.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff applied before a retried task goes back into the queue.
///
/// `Immediate` is the baseline: the task is re-enqueued as soon as the
/// attempt fails. The other variants are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryBackoff {
    #[default]
    Immediate,
    Fixed {
        delay_ms: u64,
    },
    /// `base_ms * 2^(retry - 1)`, capped at `max_ms`. With `jitter`, up to a
    /// quarter of the delay is added at random.
    Exponential {
        base_ms: u64,
        max_ms: u64,
        jitter: bool,
    },
}

impl RetryBackoff {
    /// Delay before re-enqueueing after the `retry_count`-th failure (1-based).
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential {
                base_ms,
                max_ms,
                jitter,
            } => {
                let exponent = retry_count.saturating_sub(1).min(20);
                let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
                let delay = base_ms.saturating_mul(factor).min(max_ms);
                let extra = if jitter && delay >= 4 {
                    rand::thread_rng().gen_range(0..=delay / 4)
                } else {
                    0
                };
                Duration::from_millis(delay.saturating_add(extra).min(max_ms))
            }
        }
    }
}
