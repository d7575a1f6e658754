use std::sync::Arc;
use std::time::Duration;

/// Computes the wait before the next retry. `attempt` is 0-indexed:
/// 0 = first retry, 1 = second retry, and so on.
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Exponentially increasing delay capped at 30 seconds:
/// attempt 0 → 1 s, 1 → 2 s, 2 → 4 s, 3 → 8 s, 4 → 16 s, ≥5 → 30 s.
pub fn default_backoff(attempt: u32) -> Duration {
    let capped = attempt.min(5);
    Duration::from_secs(1u64 << capped).min(Duration::from_secs(30))
}

/// Zero-delay backoff for tests.
pub fn no_backoff(_attempt: u32) -> Duration {
    Duration::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        assert_eq!(default_backoff(0), Duration::from_secs(1));
        assert_eq!(default_backoff(1), Duration::from_secs(2));
        assert_eq!(default_backoff(4), Duration::from_secs(16));
        assert_eq!(default_backoff(5), Duration::from_secs(30));
        assert_eq!(default_backoff(20), Duration::from_secs(30));
    }

    #[test]
    fn no_backoff_is_zero() {
        assert_eq!(no_backoff(7), Duration::ZERO);
    }
}
