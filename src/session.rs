//! Session token tracking for read-your-writes consistency.
//!
//! The store guarantees session consistency per logical partition: a read
//! that carries the newest session token the client has observed for its
//! partition is served at or after that write. The [`SessionContainer`]
//! owns the per-partition token map for the lifetime of a client and
//! enforces the one invariant that matters: the stored token for a
//! partition never goes backwards, no matter how responses interleave.
//!
//! Tokens are treated as opaque, monotonically comparable values. The wire
//! text is preserved and echoed back verbatim; only the logical sequence
//! number is interpreted, for ordering.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::request::{RequestContext, StoreResponse};

/// A per-partition session token.
///
/// Wire form is `"<version>#<lsn>"`; a bare `"<lsn>"` is accepted for
/// servers that omit the epoch version. Ordering is by logical sequence
/// number only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    version: u64,
    lsn: u64,
    raw: String,
}

impl SessionToken {
    /// Parses a token from its wire form.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let mut parts = raw.splitn(2, '#');
        let first = parts.next().unwrap_or_default();
        let (version, lsn) = match parts.next() {
            Some(second) => {
                let version = first.parse::<u64>().map_err(|_| {
                    StoreError::validation(format!("malformed session token: {raw:?}"))
                })?;
                let lsn = second.parse::<u64>().map_err(|_| {
                    StoreError::validation(format!("malformed session token: {raw:?}"))
                })?;
                (version, lsn)
            }
            None => {
                let lsn = first.parse::<u64>().map_err(|_| {
                    StoreError::validation(format!("malformed session token: {raw:?}"))
                })?;
                (0, lsn)
            }
        };
        Ok(Self {
            version,
            lsn,
            raw: raw.to_string(),
        })
    }

    /// Returns the logical sequence number.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    /// Returns the epoch version, 0 when the wire form omitted it.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns the original wire text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true when this token is strictly newer than `other`.
    ///
    /// Ties are not "newer": a tie keeps whatever token is already stored.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.lsn > other.lsn
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Concurrency-safe map of the newest session token observed per
/// partition.
///
/// Owned by the client instance and shared by reference with the request
/// dispatch path. Updates take the write lock and compare before
/// replacing, so concurrent out-of-order completions for the same
/// partition can never regress the stored token.
#[derive(Debug, Default)]
pub struct SessionContainer {
    tokens: RwLock<HashMap<String, SessionToken>>,
}

impl SessionContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a token observed on a response for `partition_id`.
    ///
    /// The token is stored only if it is strictly newer than the current
    /// one; ties keep the existing token. Returns true when the stored
    /// token changed.
    pub fn record_response_token(&self, partition_id: &str, token: SessionToken) -> bool {
        let mut tokens = self.tokens.write().expect("session token map poisoned");
        match tokens.get(partition_id) {
            Some(existing) if !token.is_newer_than(existing) => false,
            _ => {
                debug!(partition = partition_id, token = %token, "session token advanced");
                tokens.insert(partition_id.to_string(), token);
                true
            }
        }
    }

    /// Harvests the session token from a response, if it carries one for a
    /// known partition.
    ///
    /// Malformed tokens are dropped with a warning rather than failing the
    /// operation that produced them.
    pub fn record_response(&self, request: &RequestContext, response: &StoreResponse) {
        let (Some(partition_id), Some(raw)) =
            (request.partition_id.as_deref(), response.session_token())
        else {
            return;
        };
        match SessionToken::parse(raw) {
            Ok(token) => {
                self.record_response_token(partition_id, token);
            }
            Err(_) => {
                warn!(partition = partition_id, token = raw, "dropping malformed session token");
            }
        }
    }

    /// Returns the token to attach to `request`, if any.
    ///
    /// Master-resource requests never get a token, in any connection mode.
    /// Absence of a prior token for the partition is not an error; the
    /// request proceeds without one (first read before any write).
    pub fn token_for_request(&self, request: &RequestContext) -> Option<SessionToken> {
        if request.is_master_resource() {
            return None;
        }
        let partition_id = request.partition_id.as_deref()?;
        self.tokens
            .read()
            .expect("session token map poisoned")
            .get(partition_id)
            .cloned()
    }

    /// Returns the stored token for a partition, if any.
    pub fn token_for_partition(&self, partition_id: &str) -> Option<SessionToken> {
        self.tokens
            .read()
            .expect("session token map poisoned")
            .get(partition_id)
            .cloned()
    }

    /// Drops all stored tokens.
    pub fn clear(&self) {
        self.tokens.write().expect("session token map poisoned").clear();
    }

    /// Returns the number of partitions with a stored token.
    pub fn partition_count(&self) -> usize {
        self.tokens.read().expect("session token map poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers;
    use crate::request::{OperationKind, ResourceType};

    fn document_request(partition: &str) -> RequestContext {
        RequestContext::new(ResourceType::Document, OperationKind::Read, "dbs/d/colls/c/docs/x")
            .with_partition(partition)
    }

    #[test]
    fn test_parse_versioned_token() {
        let token = SessionToken::parse("2#1045").unwrap();
        assert_eq!(token.version(), 2);
        assert_eq!(token.lsn(), 1045);
        assert_eq!(token.as_str(), "2#1045");
    }

    #[test]
    fn test_parse_bare_lsn() {
        let token = SessionToken::parse("77").unwrap();
        assert_eq!(token.version(), 0);
        assert_eq!(token.lsn(), 77);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(SessionToken::parse("").is_err());
        assert!(SessionToken::parse("abc").is_err());
        assert!(SessionToken::parse("1#xyz").is_err());
    }

    #[test]
    fn test_newer_comparison_ignores_version() {
        let old = SessionToken::parse("3#10").unwrap();
        let new = SessionToken::parse("1#11").unwrap();
        assert!(new.is_newer_than(&old));
        assert!(!old.is_newer_than(&new));
    }

    #[test]
    fn test_tie_is_not_newer() {
        let a = SessionToken::parse("1#10").unwrap();
        let b = SessionToken::parse("2#10").unwrap();
        assert!(!a.is_newer_than(&b));
        assert!(!b.is_newer_than(&a));
    }

    #[test]
    fn test_record_keeps_newest() {
        let container = SessionContainer::new();
        assert!(container.record_response_token("p1", SessionToken::parse("0#5").unwrap()));
        assert!(container.record_response_token("p1", SessionToken::parse("0#9").unwrap()));
        // Out-of-order completion with an older token must not regress.
        assert!(!container.record_response_token("p1", SessionToken::parse("0#7").unwrap()));

        let stored = container.token_for_partition("p1").unwrap();
        assert_eq!(stored.lsn(), 9);
    }

    #[test]
    fn test_record_tie_keeps_existing() {
        let container = SessionContainer::new();
        container.record_response_token("p1", SessionToken::parse("1#5").unwrap());
        assert!(!container.record_response_token("p1", SessionToken::parse("2#5").unwrap()));
        assert_eq!(container.token_for_partition("p1").unwrap().as_str(), "1#5");
    }

    #[test]
    fn test_partitions_are_independent() {
        let container = SessionContainer::new();
        container.record_response_token("p1", SessionToken::parse("0#5").unwrap());
        container.record_response_token("p2", SessionToken::parse("0#2").unwrap());

        assert_eq!(container.token_for_partition("p1").unwrap().lsn(), 5);
        assert_eq!(container.token_for_partition("p2").unwrap().lsn(), 2);
        assert_eq!(container.partition_count(), 2);
    }

    #[test]
    fn test_master_resource_never_gets_token() {
        let container = SessionContainer::new();
        container.record_response_token("p1", SessionToken::parse("0#5").unwrap());

        let collection_read =
            RequestContext::new(ResourceType::Collection, OperationKind::Read, "dbs/d/colls/c")
                .with_partition("p1");
        assert!(container.token_for_request(&collection_read).is_none());

        let database_read =
            RequestContext::new(ResourceType::Database, OperationKind::Read, "dbs/d");
        assert!(container.token_for_request(&database_read).is_none());
    }

    #[test]
    fn test_document_request_gets_stored_token() {
        let container = SessionContainer::new();
        container.record_response_token("p1", SessionToken::parse("0#5").unwrap());

        let token = container.token_for_request(&document_request("p1")).unwrap();
        assert_eq!(token.as_str(), "0#5");
    }

    #[test]
    fn test_missing_token_is_not_an_error() {
        let container = SessionContainer::new();
        assert!(container.token_for_request(&document_request("p-new")).is_none());
    }

    #[test]
    fn test_record_response_harvests_header() {
        let container = SessionContainer::new();
        let request = document_request("p1");
        let response = StoreResponse::new(201).with_header(headers::SESSION_TOKEN, "0#12");

        container.record_response(&request, &response);
        assert_eq!(container.token_for_partition("p1").unwrap().lsn(), 12);
    }

    #[test]
    fn test_record_response_ignores_malformed_token() {
        let container = SessionContainer::new();
        let request = document_request("p1");
        let response = StoreResponse::new(201).with_header(headers::SESSION_TOKEN, "bogus");

        container.record_response(&request, &response);
        assert!(container.token_for_partition("p1").is_none());
    }

    #[test]
    fn test_clear() {
        let container = SessionContainer::new();
        container.record_response_token("p1", SessionToken::parse("0#5").unwrap());
        container.clear();
        assert_eq!(container.partition_count(), 0);
    }
}
