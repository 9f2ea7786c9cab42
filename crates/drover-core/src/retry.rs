//! Retry configuration and backoff calculation.
//!
//! Portable, sync-only building blocks for the shared reconnect discipline.
//! The async retry driver lives in `drover-client` (which has access to
//! tokio); this module only holds the parameters and the math.
//!
//! Retries are unbounded by count — the cap is on the delay between
//! attempts, and callers stop via cancellation. A retry-count ceiling, if
//! any, belongs to the presentation layer.

use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for reconnect backoff.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Base delay for exponential backoff in ms (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

/// Calculate exponential backoff delay without randomness.
///
/// Formula: `min(max_delay, base_delay * 2^attempt)` plus the full jitter
/// range. Deterministic; callers with a PRNG should prefer
/// [`backoff_delay_with_random`].
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_factor: f64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter_range = (capped as f64) * jitter_factor;
    let with_jitter = (capped as f64) + jitter_range;

    with_jitter.round() as u64
}

/// Calculate backoff delay with explicit randomness.
///
/// `random` should be a value in `[0.0, 1.0)` from a PRNG. The jitter is
/// symmetric: a factor of 0.2 varies the delay by ±20% around the capped
/// exponential value.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_with_random(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    // Maps random [0,1) to [-jitter, +jitter]
    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor;
    let with_jitter = (capped as f64) * jitter;

    with_jitter.round().max(0.0) as u64
}

impl RetryConfig {
    /// Delay for the given attempt using this config and a PRNG value.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, random: f64) -> u64 {
        backoff_delay_with_random(
            attempt,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_factor,
            random,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn config_serde_defaults_from_empty_object() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.base_delay_ms, 500);
        assert_eq!(config.max_delay_ms, 30_000);
    }

    #[test]
    fn exponential_growth_without_jitter() {
        let d0 = backoff_delay(0, 500, 30_000, 0.0);
        let d1 = backoff_delay(1, 500, 30_000, 0.0);
        let d2 = backoff_delay(2, 500, 30_000, 0.0);
        assert_eq!(d0, 500);
        assert_eq!(d1, 1000);
        assert_eq!(d2, 2000);
    }

    #[test]
    fn caps_at_max() {
        let delay = backoff_delay(12, 500, 30_000, 0.0);
        assert_eq!(delay, 30_000);
    }

    #[test]
    fn high_attempt_does_not_overflow() {
        let delay = backoff_delay(100, 500, 30_000, 0.2);
        assert!(delay > 0);
        assert!(delay <= 36_000);
    }

    #[test]
    fn random_zero_gives_minus_jitter() {
        let delay = backoff_delay_with_random(0, 1000, 30_000, 0.2, 0.0);
        assert_eq!(delay, 800);
    }

    #[test]
    fn random_half_gives_exact_base() {
        let delay = backoff_delay_with_random(0, 1000, 30_000, 0.2, 0.5);
        assert_eq!(delay, 1000);
    }

    #[test]
    fn random_one_gives_plus_jitter() {
        let delay = backoff_delay_with_random(0, 1000, 30_000, 0.2, 1.0);
        assert_eq!(delay, 1200);
    }

    proptest::proptest! {
        #[test]
        fn jittered_delay_stays_within_band(
            attempt in 0u32..64,
            random in 0.0f64..1.0,
        ) {
            let delay = backoff_delay_with_random(attempt, 500, 30_000, 0.2, random);
            // never below -20% of base, never above +20% of the cap
            proptest::prop_assert!(delay >= 400);
            proptest::prop_assert!(delay <= 36_000);
        }
    }

    #[test]
    fn delay_for_uses_config_values() {
        let config = RetryConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_for(0, 0.5), 100);
        assert_eq!(config.delay_for(3, 0.5), 800);
        assert_eq!(config.delay_for(10, 0.5), 1000);
    }
}
