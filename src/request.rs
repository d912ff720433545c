//! Request and response types exchanged with the store transport.
//!
//! A [`RequestContext`] identifies what a logical operation targets (the
//! resource type and link, the operation kind, the logical partition) and
//! carries the headers and body handed to the transport. A
//! [`StoreResponse`] is the transport's answer with typed accessors for
//! the headers the client interprets.

use std::collections::HashMap;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{StoreError, SubStatus};
use crate::headers;

/// The kind of resource a request targets.
///
/// Master resources (databases, collections) are control-plane metadata;
/// documents are data-plane. Session consistency only ever applies to the
/// data plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// A database (master resource)
    Database,
    /// A document collection (master resource)
    Collection,
    /// A document (data resource)
    Document,
}

impl ResourceType {
    /// Returns true for control-plane resources.
    ///
    /// Master-resource requests never carry a session token, in any
    /// connection mode.
    pub fn is_master(&self) -> bool {
        !matches!(self, Self::Document)
    }
}

/// The operation a request performs against its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Create a new resource
    Create,
    /// Read a single resource
    Read,
    /// Replace an existing resource
    Replace,
    /// Delete a resource
    Delete,
    /// Run a query against a collection
    Query,
}

impl OperationKind {
    /// Returns the HTTP method the gateway uses for this operation.
    pub fn http_method(&self) -> &'static str {
        match self {
            Self::Create | Self::Query => "POST",
            Self::Read => "GET",
            Self::Replace => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true for operations that mutate the resource.
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create | Self::Replace | Self::Delete)
    }
}

/// A single request handed to the transport.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The kind of resource this request targets
    pub resource_type: ResourceType,
    /// The operation to perform
    pub operation: OperationKind,
    /// Path identifying the resource, e.g. `dbs/db1/colls/c1/docs/d1`
    pub resource_link: String,
    /// Logical partition the request addresses, when it has one
    pub partition_id: Option<String>,
    /// Wire headers to send
    pub headers: HashMap<String, String>,
    /// JSON body to send, if any
    pub body: Option<serde_json::Value>,
}

impl RequestContext {
    /// Creates a request with no partition, headers, or body.
    pub fn new(
        resource_type: ResourceType,
        operation: OperationKind,
        resource_link: impl Into<String>,
    ) -> Self {
        Self {
            resource_type,
            operation,
            resource_link: resource_link.into(),
            partition_id: None,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Sets the logical partition this request addresses.
    pub fn with_partition(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = Some(partition_id.into());
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a header, replacing any existing value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Returns a header value, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns true when this request targets a control-plane resource.
    pub fn is_master_resource(&self) -> bool {
        self.resource_type.is_master()
    }
}

/// A response produced by the transport.
#[derive(Debug, Clone)]
pub struct StoreResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// JSON body, if the response carried one
    pub body: Option<serde_json::Value>,
}

impl StoreResponse {
    /// Creates a response with the given status and no headers or body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any existing value.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns a header value, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Returns the session token header, if the response carried one.
    pub fn session_token(&self) -> Option<&str> {
        self.header(headers::SESSION_TOKEN)
    }

    /// Returns the parsed sub-status header, Unknown when absent or
    /// unparseable.
    pub fn sub_status(&self) -> SubStatus {
        self.header(headers::SUB_STATUS)
            .and_then(|v| v.parse::<u32>().ok())
            .map(SubStatus::from_code)
            .unwrap_or_default()
    }

    /// Returns the server activity id, if present.
    pub fn activity_id(&self) -> Option<&str> {
        self.header(headers::ACTIVITY_ID)
    }

    /// Returns the server backoff hint for throttled responses.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header(headers::RETRY_AFTER_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the response body into a typed value.
    pub fn document<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let body = self.body.clone().ok_or_else(|| {
            StoreError::serdes("response carried no body to deserialize")
        })?;
        serde_json::from_value(body).map_err(StoreError::from)
    }
}
