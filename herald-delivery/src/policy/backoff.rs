//! Exponential backoff with jitter

use std::time::Duration;

use rand::Rng;

/// Delay before the attempt following `attempt` (1-indexed).
///
/// # Formula
/// `delay = min(base * 2^(attempt - 1), max) * (1 ± jitter)`
///
/// `jitter_factor` is clamped to `0..=1`; a non-finite factor disables jitter.
#[must_use]
pub fn exponential_delay(attempt: u32, base_ms: u64, max_ms: u64, jitter_factor: f64) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_ms
    } else {
        base_ms.saturating_mul(1u64 << exponent).min(max_ms)
    };

    let jitter_factor = if jitter_factor.is_finite() {
        jitter_factor.clamp(0.0, 1.0)
    } else {
        0.0
    };

    if delay == 0 || jitter_factor == 0.0 {
        return Duration::from_millis(delay);
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered = {
        let jitter_range = (delay as f64) * jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    Duration::from_millis(jittered)
}
