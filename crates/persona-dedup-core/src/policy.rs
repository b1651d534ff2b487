//! Retry policy for the row processor.
//!
//! A [`RetryPolicy`] decides how many classifier attempts a row may spend,
//! how long to wait between them, and which verdicts end the loop.
//!
//! # Backoff
//!
//! `backoff(n) = base_delay * min(n, cap_attempts)`: a linear ramp capped
//! at `cap_attempts`. The wait before attempt `n` is `backoff(n)` for
//! `n >= 2`; attempt 1 always runs immediately.
//!
//! ```rust
//! use std::time::Duration;
//! use persona_dedup_core::policy::{MaxAttempts, RetryPolicy};
//!
//! let policy = RetryPolicy::new(MaxAttempts::limited(3), Duration::from_millis(500), 2);
//! assert_eq!(policy.delay_before(1), Duration::ZERO);
//! assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
//! assert_eq!(policy.delay_before(3), Duration::from_millis(1000));
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::models::Verdict;

/// Upper bound on classifier attempts per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    Limited(NonZeroU32),
    /// Retry until an accepted verdict arrives. A persistently inconclusive
    /// classifier stalls the batch on that row; pair with a cancel token.
    Unbounded,
}

impl MaxAttempts {
    /// `n` is clamped to at least 1.
    pub fn limited(n: u32) -> Self {
        MaxAttempts::Limited(NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN))
    }

    pub fn allows(&self, attempt: u32) -> bool {
        match self {
            MaxAttempts::Limited(max) => attempt >= 1 && attempt <= max.get(),
            MaxAttempts::Unbounded => attempt >= 1,
        }
    }
}

impl fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxAttempts::Limited(n) => write!(f, "{}", n),
            MaxAttempts::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl FromStr for MaxAttempts {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(MaxAttempts::Unbounded);
        }
        let n: u32 = s
            .parse()
            .map_err(|_| format!("invalid max attempts '{}': expected an integer >= 1 or 'unbounded'", s))?;
        NonZeroU32::new(n)
            .map(MaxAttempts::Limited)
            .ok_or_else(|| "max attempts must be >= 1".to_string())
    }
}

/// Retry/backoff configuration for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: MaxAttempts,
    pub base_delay: Duration,
    pub cap_attempts: u32,
    accept: BTreeSet<Verdict>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MaxAttempts::limited(3), Duration::from_millis(1000), 5)
    }
}

impl RetryPolicy {
    /// Accepts `Same` and `Different`; `cap_attempts` is clamped to at least 1.
    pub fn new(max_attempts: MaxAttempts, base_delay: Duration, cap_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay,
            cap_attempts: cap_attempts.max(1),
            accept: [Verdict::Same, Verdict::Different].into_iter().collect(),
        }
    }

    /// One attempt, no retries.
    pub fn single_shot() -> Self {
        Self::new(MaxAttempts::limited(1), Duration::ZERO, 1)
    }

    /// Replace the set of verdicts that end the retry loop.
    pub fn accepting(mut self, verdicts: impl IntoIterator<Item = Verdict>) -> Self {
        self.accept = verdicts.into_iter().collect();
        self
    }

    pub fn accepts(&self, verdict: Verdict) -> bool {
        self.accept.contains(&verdict)
    }

    pub fn accepted(&self) -> impl Iterator<Item = Verdict> + '_ {
        self.accept.iter().copied()
    }

    /// Whether 1-based attempt number `attempt` may run.
    pub fn has_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.allows(attempt)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.min(self.cap_attempts))
    }

    /// Wait to observe before starting `attempt`. Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.backoff(attempt)
        }
    }
}
