use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Per-flow execution settings. Plain value type: cloning a flow clones these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub wait: Duration,
    pub timeout: Option<Timeout>,
    pub retry: Option<RetryPolicy>,
    pub optional: bool,
    pub skip: bool,
}

/// Either a duration the flow owns, or a deadline handed down by an ancestor.
///
/// Only a `Duration` timeout fails the flow when it elapses. A `Deadline`
/// bounds the budget of nested flows; the ancestor that armed it decides
/// what happens when it passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timeout {
    Duration(Duration),
    Deadline(Deadline),
}

impl Timeout {
    /// Time left from now.
    pub fn remaining(&self) -> Duration {
        match self {
            Timeout::Duration(d) => *d,
            Timeout::Deadline(deadline) => deadline.remaining(),
        }
    }

    /// Resolve against the ancestor's deadline: the earlier end wins.
    pub fn reconcile(own: Option<Timeout>, inherited: Option<Deadline>) -> Option<Timeout> {
        let Some(inherited) = inherited else {
            return own;
        };

        match own {
            Some(Timeout::Duration(d)) if d <= inherited.remaining() => Some(Timeout::Duration(d)),
            Some(Timeout::Deadline(mine)) if mine.at() <= inherited.at() => Some(Timeout::Deadline(mine)),
            _ => Some(Timeout::Deadline(inherited)),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Timeout::Duration(d)
    }
}

impl From<Deadline> for Timeout {
    fn from(deadline: Deadline) -> Self {
        Timeout::Deadline(deadline)
    }
}

/// Absolute point in time after which a flow's budget is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn from_instant(at: Instant) -> Self {
        Self { at }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Retry policy for a whole flow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub times: u32,
    #[serde(with = "millis")]
    pub interval: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(times: u32, interval: Duration) -> Self {
        Self {
            times,
            interval,
            backoff_multiplier: 1.0,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.times.max(1)
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.interval.mul_f64(self.backoff_multiplier.max(0.0).powi(exponent))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::ZERO)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
