// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backoff between generation attempts.

use std::time::Duration;

use quill_config::DispatchConfig;

/// Exponential backoff: `base * 2^retry_count`, capped at `max_delay`.
///
/// A zero base disables backoff, so a requeued job is claimable at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self { base, max_delay }
    }

    /// No delay between attempts.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.retry_base(), config.retry_max())
    }

    /// Delay before the attempt that follows `retry_count` earlier retries.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_retry() {
        let policy = RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(16));
    }

    #[test]
    fn capped_at_max_delay() {
        let policy = RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for(5), Duration::from_secs(60));
        assert_eq!(policy.delay_for(40), Duration::from_secs(60));
    }

    #[test]
    fn zero_base_disables_backoff() {
        assert_eq!(RetryPolicy::immediate().delay_for(7), Duration::ZERO);
        let policy = RetryPolicy::new(Duration::ZERO, Duration::from_secs(60));
        assert_eq!(policy.delay_for(2), Duration::ZERO);
    }
}
