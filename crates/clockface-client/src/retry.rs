use std::time::Duration;

/// Bounded exponential backoff for transient verification failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first call.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before retry `n` (1-based): `base × multiplier^(n−1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1) as i32;
        let nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exp);
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Upper bound on transport calls for one attempt.
    pub fn max_calls(&self) -> u32 {
        self.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for(2), Duration::from_millis(1500));
        assert_eq!(p.delay_for(3), Duration::from_millis(2250));
        assert_eq!(p.max_calls(), 4);
    }

    #[test]
    fn test_custom_base() {
        let p = RetryPolicy::new(5, Duration::from_millis(200));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(450));
    }
}
