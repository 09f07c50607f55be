//! Convergence polling
//!
//! Every wait point in a run goes through [`poll`]: query, check, sleep,
//! repeat. Timeouts are attempt counts times a fixed interval, never
//! wall-clock deadlines.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Attempt bound for a wait point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempts {
    /// Give up after this many queries
    Limited(u32),
    /// Never give up; log a warning every `warn_every` attempts
    Unbounded { warn_every: u32 },
}

/// How to wait for one remote state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollCondition {
    /// What is being waited for, used in logs and errors
    pub what: String,
    /// Pause between two queries
    pub interval: Duration,
    pub attempts: Attempts,
}

impl PollCondition {
    pub fn new(what: impl Into<String>, interval: Duration, attempts: Attempts) -> Self {
        Self {
            what: what.into(),
            interval,
            attempts,
        }
    }

    /// Effective timeout, or `None` when unbounded
    pub fn budget(&self) -> Option<Duration> {
        match self.attempts {
            Attempts::Limited(n) => Some(self.interval * n),
            Attempts::Unbounded { .. } => None,
        }
    }
}

/// Result of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The predicate held on attempt number `attempts`
    Satisfied { value: T, attempts: u32 },
    /// The attempt bound was reached; `last` is the final observation
    Exhausted { last: Option<T>, attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// Query until `is_satisfied` holds or the attempt bound is reached
///
/// Returns as soon as the predicate holds, without sleeping. Sleeps `interval`
/// only between attempts, and never queries again after the last one. A query
/// error aborts the wait and is returned as-is.
pub fn poll<T, E, Q, P>(
    condition: &PollCondition,
    mut query: Q,
    is_satisfied: P,
) -> Result<PollOutcome<T>, E>
where
    T: std::fmt::Debug,
    Q: FnMut() -> Result<T, E>,
    P: Fn(&T) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let value = query()?;
        debug!(what = %condition.what, attempt, observed = ?value, "poll");

        if is_satisfied(&value) {
            return Ok(PollOutcome::Satisfied {
                value,
                attempts: attempt,
            });
        }

        match condition.attempts {
            Attempts::Limited(max) if attempt >= max => {
                return Ok(PollOutcome::Exhausted {
                    last: Some(value),
                    attempts: attempt,
                });
            }
            Attempts::Unbounded { warn_every } if warn_every > 0 && attempt % warn_every == 0 => {
                warn!(
                    what = %condition.what,
                    attempt,
                    "still waiting, no attempt limit is set"
                );
            }
            _ => {}
        }

        thread::sleep(condition.interval);
    }
}
