//! Retry policy for failed store operations.
//!
//! A [`RetryPolicy`] is owned by the client and produces one
//! [`RetrySession`] per logical operation. The session owns the mutable
//! retry state (attempt count, elapsed time, last error class) and is
//! discarded at terminal success or failure; it is never shared across
//! concurrent operations.
//!
//! Classification follows the store's contract: connectivity failures,
//! partition-key-mismatch, and throttling are retriable within the
//! configured attempt budget; every other failure is surfaced to the
//! caller on first occurrence with no added delay.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::StoreError;

/// What to do with a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after sleeping `delay`.
    Retry {
        /// How long to back off before the next attempt
        delay: Duration,
        /// True when partitioning metadata should be refreshed before the
        /// next attempt (stale collection cache)
        refresh_metadata: bool,
    },
    /// Surface the error to the caller.
    DontRetry,
}

/// Classification of a failed attempt, kept in the retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network/connectivity failure
    Connectivity,
    /// Server reported stale partitioning metadata
    PartitionKeyMismatch,
    /// Server throttled the request
    Throttled,
    /// Any other failure; terminal
    Other,
}

impl ErrorClass {
    /// Classifies an error for retry purposes.
    pub fn of(error: &StoreError) -> Self {
        if error.is_transport() {
            Self::Connectivity
        } else if error.is_partition_key_mismatch() {
            Self::PartitionKeyMismatch
        } else if error.is_throttled() {
            Self::Throttled
        } else {
            Self::Other
        }
    }

    /// Returns true for classes the policy may retry.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

/// Mutable state of one logical operation's retry sequence.
#[derive(Debug, Clone)]
pub struct RetryState {
    attempts: u32,
    started: Instant,
    last_class: Option<ErrorClass>,
}

impl RetryState {
    fn new() -> Self {
        Self {
            attempts: 0,
            started: Instant::now(),
            last_class: None,
        }
    }

    /// Number of retries granted so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time since the first attempt started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Classification of the most recent failure, if any.
    pub fn last_class(&self) -> Option<ErrorClass> {
        self.last_class
    }
}

/// Decides whether failed operations are retried.
///
/// One policy object is shared by the client; each logical operation gets
/// its own session via [`RetryPolicy::new_session`].
pub trait RetryPolicy: fmt::Debug + Send + Sync {
    /// Starts a fresh retry session for one logical operation.
    fn new_session(&self) -> Box<dyn RetrySession>;
}

/// Per-operation retry decision state.
pub trait RetrySession: Send + Sync {
    /// Called after a failed attempt: decide whether to retry and how long
    /// to back off first.
    fn decide(&mut self, error: &StoreError) -> RetryDecision;

    /// Read-only view of the accumulated retry state.
    fn state(&self) -> &RetryState;

    /// Resets the session for reuse by a restarted operation.
    fn reset(&mut self);
}

/// Default attempt budget for retriable failures.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 9;

/// Default fixed backoff between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Retry policy with a fixed interval and a fixed attempt budget.
///
/// Retriable failures sleep `retry_interval` between attempts (throttled
/// responses sleep the server's hint instead, when it provides one), so a
/// fully exhausted sequence takes at least
/// `max_retry_count * retry_interval`. Terminal failures surface
/// immediately with no delay.
#[derive(Debug, Clone)]
pub struct FixedIntervalRetryPolicy {
    max_retry_count: u32,
    retry_interval: Duration,
}

impl FixedIntervalRetryPolicy {
    /// Creates a policy with the given budget and interval.
    pub fn new(max_retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            max_retry_count,
            retry_interval,
        }
    }

    /// Returns the attempt budget.
    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Returns the fixed backoff interval.
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

impl Default for FixedIntervalRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY_COUNT, DEFAULT_RETRY_INTERVAL)
    }
}

impl RetryPolicy for FixedIntervalRetryPolicy {
    fn new_session(&self) -> Box<dyn RetrySession> {
        Box::new(FixedIntervalRetrySession {
            policy: self.clone(),
            state: RetryState::new(),
        })
    }
}

struct FixedIntervalRetrySession {
    policy: FixedIntervalRetryPolicy,
    state: RetryState,
}

impl RetrySession for FixedIntervalRetrySession {
    fn decide(&mut self, error: &StoreError) -> RetryDecision {
        let class = ErrorClass::of(error);
        self.state.last_class = Some(class);

        if !class.is_retriable() {
            debug!(?class, "terminal failure, not retrying");
            return RetryDecision::DontRetry;
        }
        if self.state.attempts >= self.policy.max_retry_count {
            debug!(
                attempts = self.state.attempts,
                elapsed_ms = self.state.elapsed().as_millis() as u64,
                "retry budget exhausted"
            );
            return RetryDecision::DontRetry;
        }
        self.state.attempts += 1;

        let delay = match class {
            // A throttled response may carry a server backoff hint.
            ErrorClass::Throttled => error.retry_after().unwrap_or(self.policy.retry_interval),
            _ => self.policy.retry_interval,
        };
        debug!(
            ?class,
            attempt = self.state.attempts,
            delay_ms = delay.as_millis() as u64,
            "retrying after backoff"
        );
        RetryDecision::Retry {
            delay,
            refresh_metadata: class == ErrorClass::PartitionKeyMismatch,
        }
    }

    fn state(&self) -> &RetryState {
        &self.state
    }

    fn reset(&mut self) {
        self.state = RetryState::new();
    }
}
