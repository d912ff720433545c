//! Configuration types for the document store client.
//!
//! [`ClientConfig`] holds the client-wide policy (consistency level,
//! connection mode, retry budget, continuation-token limit);
//! [`RequestOptions`] carries per-call overrides. Both follow the
//! plain-struct-with-builders shape used across this crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::retry::{DEFAULT_MAX_RETRY_COUNT, DEFAULT_RETRY_INTERVAL};

/// Consistency level requested for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConsistencyLevel {
    /// Linearizable reads
    Strong,
    /// Reads lag writes by a bounded amount
    BoundedStaleness,
    /// Read-your-writes within a client session (default)
    #[default]
    Session,
    /// Reads never see writes out of order
    ConsistentPrefix,
    /// No ordering guarantee
    Eventual,
}

impl ConsistencyLevel {
    /// Returns the wire value for the consistency-level header.
    pub fn as_header_value(&self) -> &'static str {
        match self {
            Self::Strong => "Strong",
            Self::BoundedStaleness => "BoundedStaleness",
            Self::Session => "Session",
            Self::ConsistentPrefix => "ConsistentPrefix",
            Self::Eventual => "Eventual",
        }
    }

    /// Returns true when session tokens apply at this level.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session)
    }
}

/// How the client reaches the store.
///
/// Session-token rules are identical in both modes; the mode is carried so
/// transports can route accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionMode {
    /// All requests flow through the gateway endpoint (default)
    #[default]
    Gateway,
    /// Requests go directly to partition replicas
    Direct,
}

/// Retry budget for retriable failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Maximum number of retries granted to one logical operation
    pub max_retry_count: u32,
    /// Fixed backoff between attempts
    pub retry_interval: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl RetryOptions {
    /// Creates retry options with the given budget and interval.
    pub fn new(max_retry_count: u32, retry_interval: Duration) -> Self {
        Self {
            max_retry_count,
            retry_interval,
        }
    }

    /// Sets the attempt budget.
    pub fn with_max_retry_count(mut self, max_retry_count: u32) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    /// Sets the fixed backoff interval.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

/// Client-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Consistency level applied to requests unless overridden per call
    pub consistency_level: ConsistencyLevel,
    /// How the client reaches the store
    pub connection_mode: ConnectionMode,
    /// Retry budget for retriable failures
    pub retry_options: RetryOptions,
    /// Upper bound in KB for continuation tokens the server may return.
    /// The header is only sent for positive values.
    pub continuation_token_limit_kb: Option<u32>,
}

impl ClientConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the consistency level.
    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = level;
        self
    }

    /// Sets the connection mode.
    pub fn with_connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    /// Sets the retry budget.
    pub fn with_retry_options(mut self, retry_options: RetryOptions) -> Self {
        self.retry_options = retry_options;
        self
    }

    /// Sets the continuation-token limit in KB.
    pub fn with_continuation_token_limit_kb(mut self, limit_kb: u32) -> Self {
        self.continuation_token_limit_kb = Some(limit_kb);
        self
    }

    /// Returns the continuation-token limit to send, if one applies.
    ///
    /// A configured value of zero is treated as unset; the header is only
    /// emitted for positive limits.
    pub fn effective_continuation_limit_kb(&self) -> Option<u32> {
        self.continuation_token_limit_kb.filter(|kb| *kb > 0)
    }
}

/// Per-call overrides for a single operation.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Explicit session token to send instead of the tracked one
    pub session_token: Option<String>,
    /// Consistency level for this call only
    pub consistency_level: Option<ConsistencyLevel>,
    /// Continuation-token limit for this call only
    pub continuation_token_limit_kb: Option<u32>,
    /// Continuation token from a previous query page
    pub continuation: Option<String>,
    /// Token the caller can cancel to abandon the operation mid-retry
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    /// Creates empty options (no overrides).
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the session token for this call.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Overrides the consistency level for this call.
    pub fn with_consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    /// Overrides the continuation-token limit for this call.
    pub fn with_continuation_token_limit_kb(mut self, limit_kb: u32) -> Self {
        self.continuation_token_limit_kb = Some(limit_kb);
        self
    }

    /// Continues a query from a previous page.
    pub fn with_continuation(mut self, continuation: impl Into<String>) -> Self {
        self.continuation = Some(continuation.into());
        self
    }

    /// Attaches a cancellation token for abandoning the operation.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }
}
