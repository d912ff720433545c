//! Wire header names used by the document store gateway protocol.
//!
//! All request and response metadata travels in `x-ms-*` headers. The
//! constants here are the single source of truth for header names; request
//! building and response parsing both go through them.

/// Session token for session-consistency reads ("read your writes").
///
/// Attached to document-level requests once a token has been observed for
/// the target partition. Never attached to master-resource requests.
pub const SESSION_TOKEN: &str = "x-ms-session-token";

/// Consistency level requested for this call (e.g. `Session`).
pub const CONSISTENCY_LEVEL: &str = "x-ms-consistency-level";

/// Upper bound, in kilobytes, on the continuation token the server may
/// return for query responses.
pub const CONTINUATION_TOKEN_LIMIT_KB: &str =
    "x-ms-documentdb-responsecontinuationtokenlimitinkb";

/// Continuation token echoed between query pages.
pub const CONTINUATION: &str = "x-ms-continuation";

/// Serialized partition key for document-level requests.
pub const PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";

/// Server sub-status code qualifying the HTTP status on failures.
pub const SUB_STATUS: &str = "x-ms-substatus";

/// Server hint, in milliseconds, for how long to back off after a
/// throttled (429) response.
pub const RETRY_AFTER_MS: &str = "x-ms-retry-after-ms";

/// Server-assigned id correlating a request with server-side diagnostics.
pub const ACTIVITY_ID: &str = "x-ms-activity-id";

/// Marks a request as a query (content negotiation for the query body).
pub const IS_QUERY: &str = "x-ms-documentdb-isquery";
