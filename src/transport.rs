//! Transport abstraction and the gateway HTTP implementation.
//!
//! The [`StoreTransport`] trait is the seam between the client and the
//! wire: the client builds a [`RequestContext`], the transport produces a
//! [`StoreResponse`] or a classified [`StoreError`]. Tests swap in a mock
//! transport; production uses [`GatewayTransport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StoreError, SubStatus};
use crate::headers;
use crate::request::{RequestContext, StoreResponse};

/// Trait for delivering requests to the store.
///
/// Implementations must be safe to share across concurrent in-flight
/// operations on the same client instance.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use docstore_client::{
///     OperationKind, RequestContext, ResourceType, StoreError, StoreResponse, StoreTransport,
/// };
///
/// struct Loopback;
///
/// #[async_trait]
/// impl StoreTransport for Loopback {
///     async fn send(&self, request: RequestContext) -> Result<StoreResponse, StoreError> {
///         Ok(StoreResponse::new(200)
///             .with_body(serde_json::json!({ "link": request.resource_link })))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let request = RequestContext::new(
///     ResourceType::Document,
///     OperationKind::Read,
///     "dbs/d/colls/c/docs/x",
/// );
/// let response = Loopback.send(request).await.unwrap();
/// assert_eq!(response.status, 200);
/// # });
/// ```
#[async_trait]
pub trait StoreTransport: Send + Sync {
    /// Sends one request and returns the server's response.
    ///
    /// Connectivity failures surface as [`StoreError::Transport`];
    /// non-success statuses surface as [`StoreError::Service`] carrying
    /// the wire status and sub-status.
    async fn send(&self, request: RequestContext) -> Result<StoreResponse, StoreError>;
}

/// Shared handle to a transport implementation.
pub type SharedStoreTransport = Arc<dyn StoreTransport>;

/// HTTP transport that routes every request through the gateway endpoint.
pub struct GatewayTransport {
    /// HTTP client for making requests
    http_client: reqwest::Client,
    /// Gateway base URL, e.g. `https://contoso.documents.example.com`
    endpoint: String,
}

impl GatewayTransport {
    /// Creates a gateway transport for the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Creates a gateway transport with a caller-supplied HTTP client,
    /// for connection-pool or TLS customization.
    pub fn with_http_client(endpoint: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }

    /// Builds the request URL for a resource link, encoding each path
    /// segment.
    fn request_url(&self, resource_link: &str) -> String {
        let encoded = resource_link
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.endpoint.trim_end_matches('/'), encoded)
    }
}

/// Converts a raw HTTP response into a [`StoreResponse`] or the
/// appropriate error.
fn convert_response(
    status: u16,
    response_headers: HashMap<String, String>,
    body_bytes: &[u8],
) -> Result<StoreResponse, StoreError> {
    if !(200..300).contains(&status) {
        let message = String::from_utf8_lossy(body_bytes).into_owned();
        let sub_status = response_headers
            .get(headers::SUB_STATUS)
            .and_then(|v| v.parse::<u32>().ok())
            .map(SubStatus::from_code)
            .unwrap_or_default();
        let retry_after = response_headers
            .get(headers::RETRY_AFTER_MS)
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis);
        return Err(StoreError::Service {
            status,
            sub_status,
            message,
            activity_id: response_headers.get(headers::ACTIVITY_ID).cloned(),
            retry_after,
        });
    }

    let body = if body_bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(body_bytes).map_err(|e| {
            StoreError::serdes(format!("failed to parse response body: {e}"))
        })?)
    };

    Ok(StoreResponse {
        status,
        headers: response_headers,
        body,
    })
}

#[async_trait]
impl StoreTransport for GatewayTransport {
    async fn send(&self, request: RequestContext) -> Result<StoreResponse, StoreError> {
        let url = self.request_url(&request.resource_link);

        let mut builder = match request.operation.http_method() {
            "GET" => self.http_client.get(&url),
            "POST" => self.http_client.post(&url),
            "PUT" => self.http_client.put(&url),
            "DELETE" => self.http_client.delete(&url),
            method => {
                return Err(StoreError::validation(format!(
                    "unsupported HTTP method: {method}"
                )))
            }
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| StoreError::Transport {
            message: format!("HTTP request failed: {e}"),
            is_connect: e.is_connect() || e.is_timeout(),
        })?;

        let status = response.status().as_u16();
        let response_headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();

        let body_bytes = response.bytes().await.map_err(|e| {
            StoreError::transport(format!("failed to read response body: {e}"))
        })?;

        convert_response(status, response_headers, &body_bytes)
    }
}
