//! Error types for the document store client.
//!
//! This module defines the failure taxonomy observed by callers: transport
//! failures, server-signaled errors carrying a status/sub-status pair, and
//! local failures (serialization, validation, cancellation). Retriability
//! classification lives in [`crate::retry`]; the helpers here only expose
//! the facts that classification needs.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for the document store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network/connectivity failure before a server response was produced.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the underlying failure
        message: String,
        /// True when the failure was a connect-level failure (host
        /// unreachable, refused) rather than a mid-request failure
        is_connect: bool,
    },

    /// Server-signaled error carrying the wire status and sub-status.
    #[error("Service error {status}/{sub_status:?}: {message}")]
    Service {
        /// HTTP status code returned by the server
        status: u16,
        /// Sub-status qualifying the HTTP status
        sub_status: SubStatus,
        /// Server-provided error body, if any
        message: String,
        /// Server activity id correlating this failure, if present
        activity_id: Option<String>,
        /// Server backoff hint for throttled responses, if present
        retry_after: Option<Duration>,
    },

    /// Serialization/deserialization failure.
    #[error("Serialization error: {message}")]
    SerDes {
        /// Description of the serialization failure
        message: String,
    },

    /// Invalid configuration or arguments.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the validation failure
        message: String,
    },

    /// The caller abandoned the operation before it completed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Creates a new mid-request Transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            is_connect: false,
        }
    }

    /// Creates a new connect-level Transport error (host unreachable).
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            is_connect: true,
        }
    }

    /// Creates a new Service error from a status/sub-status pair.
    pub fn service(status: u16, sub_status: SubStatus, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            sub_status,
            message: message.into(),
            activity_id: None,
            retry_after: None,
        }
    }

    /// Creates a new throttled (HTTP 429) Service error, with the server's
    /// backoff hint when it sent one.
    pub fn throttled(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::Service {
            status: 429,
            sub_status: SubStatus::Unknown,
            message: message.into(),
            activity_id: None,
            retry_after,
        }
    }

    /// Creates a new Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new SerDes error.
    pub fn serdes(message: impl Into<String>) -> Self {
        Self::SerDes {
            message: message.into(),
        }
    }

    /// Returns the HTTP status for Service errors, None otherwise.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the sub-status for Service errors, None otherwise.
    pub fn sub_status(&self) -> Option<SubStatus> {
        match self {
            Self::Service { sub_status, .. } => Some(*sub_status),
            _ => None,
        }
    }

    /// Returns the server backoff hint, if this is a Service error that
    /// carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Service { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for network/connectivity failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns true when the server throttled the request (HTTP 429).
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Service { status: 429, .. })
    }

    /// Returns true when the server reported stale partitioning metadata.
    pub fn is_partition_key_mismatch(&self) -> bool {
        matches!(
            self,
            Self::Service {
                sub_status: SubStatus::PartitionKeyMismatch,
                ..
            }
        )
    }
}

/// Sub-status code qualifying an HTTP status on server-signaled failures.
///
/// Codes the client does not classify surface as [`SubStatus::Unknown`],
/// preserving nothing beyond the fact that the server sent an
/// unrecognized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SubStatus {
    /// No sub-status, or a value the client does not classify
    #[default]
    Unknown,
    /// Cached resource-name metadata is stale
    NameCacheIsStale,
    /// Cached partitioning metadata is stale relative to the collection
    PartitionKeyMismatch,
    /// The addressed partition key range has been split or merged away
    PartitionKeyRangeGone,
}

impl SubStatus {
    /// Maps a wire sub-status code to its classification.
    pub fn from_code(code: u32) -> Self {
        match code {
            1000 => Self::NameCacheIsStale,
            1001 => Self::PartitionKeyMismatch,
            1002 => Self::PartitionKeyRangeGone,
            _ => Self::Unknown,
        }
    }

    /// Returns the wire code for this sub-status, 0 for Unknown.
    pub fn code(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::NameCacheIsStale => 1000,
            Self::PartitionKeyMismatch => 1001,
            Self::PartitionKeyRangeGone => 1002,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerDes {
            message: error.to_string(),
        }
    }
}
