//! Reconnect timing.
//!
//! [`ReconnectPolicy`] maps the zero-based index of a retry to the delay
//! before it. Both shapes guarantee a delay that is positive, non-decreasing
//! until the counter resets, and never above [`ReconnectPolicy::ceiling`].
//! [`ReconnectCounter`] holds the attempt count across sessions.

use std::time::Duration;

use vigil_config::ReconnectConfig;

/// Smallest delay a policy will ever produce.
pub const MIN_DELAY: Duration = Duration::from_millis(1);

/// How long to wait before reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// `delay = min(base * 2^attempt, ceiling)`. No attempt ceiling.
    Exponential {
        /// Delay of the first retry.
        base: Duration,
        /// Upper bound on any delay.
        ceiling: Duration,
    },
    /// `delay` for the first `max_attempts` retries, then `cooldown` once,
    /// after which the counter starts over.
    Fixed {
        /// Delay of each regular retry.
        delay: Duration,
        /// Regular retries before the cool-down.
        max_attempts: u32,
        /// Cool-down delay.
        cooldown: Duration,
    },
}

/// Result of consulting the policy for one retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the retry.
    pub delay: Duration,
    /// True if this is the cool-down retry; the counter must be reset.
    pub cooldown: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        match *config {
            ReconnectConfig::Exponential {
                base_ms,
                ceiling_ms,
            } => {
                let base = Duration::from_millis(base_ms).max(MIN_DELAY);
                Self::Exponential {
                    base,
                    ceiling: Duration::from_millis(ceiling_ms).max(base),
                }
            }
            ReconnectConfig::Fixed {
                delay_ms,
                max_attempts,
                cooldown_ms,
            } => {
                let delay = Duration::from_millis(delay_ms).max(MIN_DELAY);
                Self::Fixed {
                    delay,
                    max_attempts,
                    cooldown: Duration::from_millis(cooldown_ms).max(delay),
                }
            }
        }
    }
}

impl ReconnectPolicy {
    /// Consult the policy for the retry with zero-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Backoff {
        match *self {
            Self::Exponential { base, ceiling } => {
                let delay = 2u32
                    .checked_pow(attempt)
                    .and_then(|factor| base.checked_mul(factor))
                    .map_or(ceiling, |d| d.min(ceiling));
                Backoff {
                    delay: delay.max(MIN_DELAY),
                    cooldown: false,
                }
            }
            Self::Fixed {
                delay,
                max_attempts,
                cooldown,
            } => {
                if attempt < max_attempts {
                    Backoff {
                        delay: delay.max(MIN_DELAY),
                        cooldown: false,
                    }
                } else {
                    Backoff {
                        delay: cooldown.max(MIN_DELAY),
                        cooldown: true,
                    }
                }
            }
        }
    }

    /// Delay before the retry with zero-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff(attempt).delay
    }

    /// Upper bound on every delay this policy produces.
    pub fn ceiling(&self) -> Duration {
        match *self {
            Self::Exponential { ceiling, .. } => ceiling,
            Self::Fixed { cooldown, .. } => cooldown,
        }
    }
}

/// Consecutive failed attempts since the last successful sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectCounter {
    attempts: u32,
}

impl ReconnectCounter {
    /// Current count.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record one more failure and return the previous count, which is the
    /// zero-based index of the retry being scheduled.
    pub fn record_failure(&mut self) -> u32 {
        let index = self.attempts;
        self.attempts = self.attempts.saturating_add(1);
        index
    }

    /// Reset to zero.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
