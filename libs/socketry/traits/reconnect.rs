use std::time::Duration;

/// Decides how a client retries after its connection drops
///
/// The session asks for the delay before each attempt, passing the number of
/// attempts already made since the last successful connect (0-indexed).
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before the next attempt, or `None` when the policy gives up
    fn next_delay(&self, attempts_made: u32) -> Option<Duration>;

    /// Upper bound on attempts, `None` for unbounded
    fn max_attempts(&self) -> Option<u32>;

    /// Whether another attempt is allowed
    fn should_reconnect(&self, attempts_made: u32) -> bool {
        self.max_attempts().map_or(true, |max| attempts_made < max)
    }
}

/// Fixed delay between attempts
///
/// This is the default policy: the session sleeps the same configured delay
/// before every attempt.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// # Arguments
    /// * `delay` - The fixed delay between reconnects
    /// * `max_attempts` - Maximum number of attempts (None = unlimited)
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    /// Build from the config convention where `0` means unbounded
    pub fn from_config(delay: Duration, max_reconnects: u32) -> Self {
        Self::new(delay, (max_reconnects > 0).then_some(max_reconnects))
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        self.should_reconnect(attempts_made).then_some(self.delay)
    }

    fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

/// Exponential backoff
///
/// Delays grow as `initial_delay * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempts_made: u32) -> Option<Duration> {
        if !self.should_reconnect(attempts_made) {
            return None;
        }

        let base = self.initial_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempts_made).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor);
        Some(Duration::from_millis(
            delay.min(self.max_delay.as_millis() as u64),
        ))
    }

    fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

/// Never reconnect
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempts_made: u32) -> Option<Duration> {
        None
    }

    fn max_attempts(&self) -> Option<u32> {
        Some(0)
    }
}
