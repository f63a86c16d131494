//! Backoff used while a background task waits for connectivity.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::connectivity::NetworkStatus;

/// Polling schedule for the network status.
#[derive(Debug, Clone)]
pub struct ConnectivityRetry {
    /// Delay before the first poll.
    pub base_delay: Duration,
    /// Whether to double the delay after each poll.
    pub exponential_backoff: bool,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl ConnectivityRetry {
    /// Creates a schedule starting at `base_delay`.
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            exponential_backoff: true,
            max_delay: Duration::from_secs(60),
        }
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Enables or disables exponential backoff.
    #[must_use]
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };

        delay.min(self.max_delay)
    }

    /// Polls `status` until it reports connected or `budget` runs out.
    ///
    /// Returns true if the network came back in time.
    pub async fn wait_until_connected(&self, status: &dyn NetworkStatus, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        let mut attempt = 0u32;

        while !status.is_connected() {
            attempt = attempt.saturating_add(1);
            let now = Instant::now();
            if now >= deadline {
                debug!(attempt, "Gave up waiting for connectivity");
                return false;
            }
            let delay = self.delay_for_attempt(attempt).min(deadline - now);
            debug!(attempt, delay_ms = delay.as_millis(), "Waiting for connectivity");
            tokio::time::sleep(delay).await;
        }
        true
    }
}

impl Default for ConnectivityRetry {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::SharedNetworkStatus;

    #[test]
    fn test_exponential_backoff() {
        let retry = ConnectivityRetry::default();

        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_secs(8));
    }

    #[test]
    fn test_max_delay_cap() {
        let retry = ConnectivityRetry::new(Duration::from_secs(10));

        // Capped at 60 seconds
        assert_eq!(retry.delay_for_attempt(5), Duration::from_secs(60));
        assert_eq!(retry.delay_for_attempt(40), Duration::from_secs(60));
    }

    #[test]
    fn test_constant_delay() {
        let retry = ConnectivityRetry::new(Duration::from_millis(250)).with_exponential_backoff(false);
        assert_eq!(retry.delay_for_attempt(7), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_wait_returns_when_online() {
        let retry = ConnectivityRetry::new(Duration::from_millis(5));
        let status = SharedNetworkStatus::new();
        assert!(retry.wait_until_connected(&status, Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_wait_gives_up_after_budget() {
        let retry = ConnectivityRetry::new(Duration::from_millis(5));
        let status = SharedNetworkStatus::offline();
        assert!(!retry.wait_until_connected(&status, Duration::from_millis(30)).await);
    }

    #[tokio::test]
    async fn test_wait_sees_recovery() {
        let retry = ConnectivityRetry::new(Duration::from_millis(5));
        let status = SharedNetworkStatus::offline();
        let flipper = status.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flipper.set_connected(true);
        });
        assert!(retry.wait_until_connected(&status, Duration::from_secs(5)).await);
    }
}
