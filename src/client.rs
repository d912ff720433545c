//! The document store client and its request dispatch path.
//!
//! [`DocumentStoreClient`] is the async entry point for all operations.
//! Every call flows through one private dispatch path that:
//!
//! 1. builds the wire headers (consistency level, session token when the
//!    request is eligible, continuation-token limit for queries),
//! 2. runs the transport call under a fresh retry session, sleeping the
//!    policy's backoff between attempts, and
//! 3. harvests the response session token into the shared
//!    [`SessionContainer`] on success.
//!
//! Retry backoff suspends only the operation awaiting retry; other
//! concurrent operations on the same client proceed unaffected. A
//! cancelled operation stops scheduling attempts and never writes a late
//! response's token into shared state.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ConsistencyLevel, RequestOptions};
use crate::error::StoreError;
use crate::headers;
use crate::request::{OperationKind, RequestContext, ResourceType, StoreResponse};
use crate::retry::{FixedIntervalRetryPolicy, RetryDecision, RetryPolicy};
use crate::session::SessionContainer;
use crate::transport::SharedStoreTransport;

/// Hook invoked before a retry that was triggered by stale partitioning
/// metadata, so an address/metadata cache can refresh itself.
#[async_trait]
pub trait MetadataRefresher: Send + Sync {
    /// Refreshes cached metadata for the request's target collection.
    async fn refresh(&self, request: &RequestContext);
}

/// Default refresher: nothing cached, nothing to refresh.
struct NoopMetadataRefresher;

#[async_trait]
impl MetadataRefresher for NoopMetadataRefresher {
    async fn refresh(&self, request: &RequestContext) {
        debug!(link = %request.resource_link, "no metadata cache to refresh");
    }
}

/// Async client for a partitioned document store.
///
/// The client owns the per-partition session token map for its lifetime
/// and shares it across all operations; cloning the client (via `Arc`
/// internals) is cheap and preserves the session.
pub struct DocumentStoreClient {
    transport: SharedStoreTransport,
    session: Arc<SessionContainer>,
    retry_policy: Arc<dyn RetryPolicy>,
    refresher: Arc<dyn MetadataRefresher>,
    config: ClientConfig,
}

/// Builder for [`DocumentStoreClient`].
pub struct DocumentStoreClientBuilder {
    transport: Option<SharedStoreTransport>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    refresher: Option<Arc<dyn MetadataRefresher>>,
    config: ClientConfig,
}

impl DocumentStoreClientBuilder {
    fn new() -> Self {
        Self {
            transport: None,
            retry_policy: None,
            refresher: None,
            config: ClientConfig::default(),
        }
    }

    /// Sets the transport. Required.
    pub fn transport(mut self, transport: SharedStoreTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the client configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the retry policy derived from the configuration.
    pub fn retry_policy(mut self, retry_policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Sets the partition-metadata refresh hook.
    pub fn metadata_refresher(mut self, refresher: Arc<dyn MetadataRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Builds the client.
    pub fn build(self) -> Result<DocumentStoreClient, StoreError> {
        let transport = self
            .transport
            .ok_or_else(|| StoreError::validation("a transport is required"))?;
        let retry_policy = self.retry_policy.unwrap_or_else(|| {
            Arc::new(FixedIntervalRetryPolicy::new(
                self.config.retry_options.max_retry_count,
                self.config.retry_options.retry_interval,
            ))
        });
        Ok(DocumentStoreClient {
            transport,
            session: Arc::new(SessionContainer::new()),
            retry_policy,
            refresher: self.refresher.unwrap_or_else(|| Arc::new(NoopMetadataRefresher)),
            config: self.config,
        })
    }
}

impl DocumentStoreClient {
    /// Returns a builder.
    pub fn builder() -> DocumentStoreClientBuilder {
        DocumentStoreClientBuilder::new()
    }

    /// Creates a client from a transport and configuration, with the
    /// retry policy derived from the configuration.
    pub fn new(transport: SharedStoreTransport, config: ClientConfig) -> Self {
        Self::builder()
            .transport(transport)
            .config(config)
            .build()
            .expect("transport provided")
    }

    /// Returns the session token container for inspection.
    pub fn session(&self) -> &SessionContainer {
        &self.session
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Database operations (master resources)
    // ------------------------------------------------------------------

    /// Creates a database with the given id.
    pub async fn create_database(
        &self,
        id: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request = RequestContext::new(ResourceType::Database, OperationKind::Create, "dbs")
            .with_body(serde_json::json!({ "id": id }));
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Reads a database by link, e.g. `dbs/db1`.
    pub async fn read_database(
        &self,
        database_link: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request =
            RequestContext::new(ResourceType::Database, OperationKind::Read, database_link);
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Deletes a database by link.
    pub async fn delete_database(
        &self,
        database_link: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request =
            RequestContext::new(ResourceType::Database, OperationKind::Delete, database_link);
        self.execute(request, options.unwrap_or_default()).await
    }

    // ------------------------------------------------------------------
    // Collection operations (master resources)
    // ------------------------------------------------------------------

    /// Creates a collection with the given id under a database link.
    pub async fn create_collection(
        &self,
        database_link: &str,
        id: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request = RequestContext::new(
            ResourceType::Collection,
            OperationKind::Create,
            format!("{database_link}/colls"),
        )
        .with_body(serde_json::json!({ "id": id }));
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Reads a collection by link, e.g. `dbs/db1/colls/c1`.
    pub async fn read_collection(
        &self,
        collection_link: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request =
            RequestContext::new(ResourceType::Collection, OperationKind::Read, collection_link);
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Deletes a collection by link.
    pub async fn delete_collection(
        &self,
        collection_link: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request = RequestContext::new(
            ResourceType::Collection,
            OperationKind::Delete,
            collection_link,
        );
        self.execute(request, options.unwrap_or_default()).await
    }

    // ------------------------------------------------------------------
    // Document operations (data resources, session-consistency eligible)
    // ------------------------------------------------------------------

    /// Creates a document in a collection.
    ///
    /// `partition_key` is the document's logical partition key value; the
    /// session token for that partition is attached automatically under
    /// session consistency.
    pub async fn create_document<T: serde::Serialize>(
        &self,
        collection_link: &str,
        partition_key: &str,
        document: &T,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let body = serde_json::to_value(document)?;
        let request = self.document_request(
            OperationKind::Create,
            format!("{collection_link}/docs"),
            partition_key,
        )?
        .with_body(body);
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Reads a document by link, e.g. `dbs/db1/colls/c1/docs/d1`.
    pub async fn read_document(
        &self,
        document_link: &str,
        partition_key: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request =
            self.document_request(OperationKind::Read, document_link.to_string(), partition_key)?;
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Replaces a document by link.
    pub async fn replace_document<T: serde::Serialize>(
        &self,
        document_link: &str,
        partition_key: &str,
        document: &T,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let body = serde_json::to_value(document)?;
        let request = self
            .document_request(OperationKind::Replace, document_link.to_string(), partition_key)?
            .with_body(body);
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Deletes a document by link.
    pub async fn delete_document(
        &self,
        document_link: &str,
        partition_key: &str,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let request = self.document_request(
            OperationKind::Delete,
            document_link.to_string(),
            partition_key,
        )?;
        self.execute(request, options.unwrap_or_default()).await
    }

    /// Runs a query against a collection.
    ///
    /// Pass a partition key to scope the query to one logical partition
    /// (and attach its session token under session consistency); pass
    /// `None` for a cross-partition query.
    pub async fn query_documents(
        &self,
        collection_link: &str,
        query: &str,
        partition_key: Option<&str>,
        options: Option<RequestOptions>,
    ) -> Result<StoreResponse, StoreError> {
        let mut request = RequestContext::new(
            ResourceType::Document,
            OperationKind::Query,
            format!("{collection_link}/docs"),
        )
        .with_body(serde_json::json!({ "query": query }));
        request.set_header(headers::IS_QUERY, "true");
        if let Some(pk) = partition_key {
            request = request.with_partition(pk);
            request.set_header(headers::PARTITION_KEY, Self::partition_key_header(pk)?);
        }
        self.execute(request, options.unwrap_or_default()).await
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn document_request(
        &self,
        operation: OperationKind,
        resource_link: String,
        partition_key: &str,
    ) -> Result<RequestContext, StoreError> {
        if partition_key.is_empty() {
            return Err(StoreError::validation("partition key must not be empty"));
        }
        let mut request = RequestContext::new(ResourceType::Document, operation, resource_link)
            .with_partition(partition_key);
        request.set_header(headers::PARTITION_KEY, Self::partition_key_header(partition_key)?);
        Ok(request)
    }

    fn partition_key_header(partition_key: &str) -> Result<String, StoreError> {
        serde_json::to_string(&[partition_key]).map_err(StoreError::from)
    }

    /// Consistency level in effect for one call.
    fn effective_consistency(&self, options: &RequestOptions) -> ConsistencyLevel {
        options.consistency_level.unwrap_or(self.config.consistency_level)
    }

    /// Sets the headers that do not change between attempts.
    fn prepare_headers(&self, request: &mut RequestContext, options: &RequestOptions) {
        request.set_header(
            headers::CONSISTENCY_LEVEL,
            self.effective_consistency(options).as_header_value(),
        );
        if request.operation == OperationKind::Query {
            let limit = options
                .continuation_token_limit_kb
                .filter(|kb| *kb > 0)
                .or_else(|| self.config.effective_continuation_limit_kb());
            if let Some(kb) = limit {
                request.set_header(headers::CONTINUATION_TOKEN_LIMIT_KB, kb.to_string());
            }
            if let Some(continuation) = &options.continuation {
                request.set_header(headers::CONTINUATION, continuation.clone());
            }
        }
    }

    /// Attaches the session token for this attempt, if the request is
    /// eligible.
    ///
    /// Re-resolved before every attempt so a retry carries the newest
    /// token observed meanwhile. Master-resource requests never carry the
    /// header, even when the caller supplied an explicit token.
    fn attach_session_token(&self, request: &mut RequestContext, options: &RequestOptions) {
        request.headers.remove(headers::SESSION_TOKEN);
        if request.is_master_resource() {
            return;
        }
        if let Some(token) = &options.session_token {
            request.set_header(headers::SESSION_TOKEN, token.clone());
            return;
        }
        if !self.effective_consistency(options).is_session() {
            return;
        }
        if let Some(token) = self.session.token_for_request(request) {
            request.set_header(headers::SESSION_TOKEN, token.as_str().to_string());
        }
    }

    /// Runs one logical operation: attach headers, send, retry per the
    /// policy, and harvest the response session token.
    async fn execute(
        &self,
        mut request: RequestContext,
        options: RequestOptions,
    ) -> Result<StoreResponse, StoreError> {
        let cancel = options.cancellation.clone().unwrap_or_else(CancellationToken::new);
        self.prepare_headers(&mut request, &options);

        let mut retry = self.retry_policy.new_session();
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            self.attach_session_token(&mut request, &options);

            match self.transport.send(request.clone()).await {
                Ok(response) => {
                    // A late response for an abandoned operation must not
                    // touch shared session state.
                    if cancel.is_cancelled() {
                        return Err(StoreError::Cancelled);
                    }
                    self.session.record_response(&request, &response);
                    return Ok(response);
                }
                Err(error) => match retry.decide(&error) {
                    RetryDecision::Retry { delay, refresh_metadata } => {
                        warn!(
                            link = %request.resource_link,
                            attempt = retry.state().attempts(),
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "attempt failed, retrying"
                        );
                        if refresh_metadata {
                            self.refresher.refresh(&request).await;
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(StoreError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    RetryDecision::DontRetry => return Err(error),
                },
            }
        }
    }
}

impl std::fmt::Debug for DocumentStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStoreClient")
            .field("config", &self.config)
            .field("tracked_partitions", &self.session.partition_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::config::RetryOptions;
    use crate::error::SubStatus;
    use crate::transport::StoreTransport;

    /// Minimal queued-response transport for unit tests. The integration
    /// suite has a fuller version in tests/common.
    struct QueueTransport {
        responses: Mutex<VecDeque<Result<StoreResponse, StoreError>>>,
        sent: Mutex<Vec<RequestContext>>,
    }

    impl QueueTransport {
        fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn push(self, response: Result<StoreResponse, StoreError>) -> Self {
            self.responses.lock().unwrap().push_back(response);
            self
        }

        fn sent(&self) -> Vec<RequestContext> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StoreTransport for QueueTransport {
        async fn send(&self, request: RequestContext) -> Result<StoreResponse, StoreError> {
            self.sent.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(StoreResponse::new(200)))
        }
    }

    fn client_with(transport: Arc<QueueTransport>) -> DocumentStoreClient {
        let config = ClientConfig::new()
            .with_retry_options(RetryOptions::new(2, Duration::from_millis(1)));
        DocumentStoreClient::new(transport, config)
    }

    #[tokio::test]
    async fn test_builder_requires_transport() {
        let result = DocumentStoreClient::builder().build();
        assert!(matches!(result, Err(StoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_write_response_token_attached_to_next_read() {
        let transport = Arc::new(
            QueueTransport::new()
                .push(Ok(StoreResponse::new(201).with_header(headers::SESSION_TOKEN, "0#5")))
                .push(Ok(StoreResponse::new(200))),
        );
        let client = client_with(transport.clone());

        client
            .create_document("dbs/d/colls/c", "pk1", &serde_json::json!({"id": "x"}), None)
            .await
            .unwrap();
        client
            .read_document("dbs/d/colls/c/docs/x", "pk1", None)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].header(headers::SESSION_TOKEN), None);
        assert_eq!(sent[1].header(headers::SESSION_TOKEN), Some("0#5"));
    }

    #[tokio::test]
    async fn test_master_request_never_carries_session_token() {
        let transport = Arc::new(
            QueueTransport::new()
                .push(Ok(StoreResponse::new(201).with_header(headers::SESSION_TOKEN, "0#5"))),
        );
        let client = client_with(transport.clone());

        client
            .create_document("dbs/d/colls/c", "pk1", &serde_json::json!({"id": "x"}), None)
            .await
            .unwrap();
        client.read_collection("dbs/d/colls/c", None).await.unwrap();
        // Even an explicit override is suppressed on the control plane.
        client
            .read_database(
                "dbs/d",
                Some(RequestOptions::new().with_session_token("0#99")),
            )
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[1].header(headers::SESSION_TOKEN), None);
        assert_eq!(sent[2].header(headers::SESSION_TOKEN), None);
    }

    #[tokio::test]
    async fn test_explicit_session_token_override() {
        let transport = Arc::new(QueueTransport::new());
        let client = client_with(transport.clone());

        client
            .read_document(
                "dbs/d/colls/c/docs/x",
                "pk1",
                Some(RequestOptions::new().with_session_token("0#123")),
            )
            .await
            .unwrap();

        assert_eq!(transport.sent()[0].header(headers::SESSION_TOKEN), Some("0#123"));
    }

    #[tokio::test]
    async fn test_non_session_consistency_sends_no_token() {
        let transport = Arc::new(
            QueueTransport::new()
                .push(Ok(StoreResponse::new(201).with_header(headers::SESSION_TOKEN, "0#5"))),
        );
        let config = ClientConfig::new().with_consistency_level(ConsistencyLevel::Eventual);
        let client = DocumentStoreClient::new(transport.clone(), config);

        client
            .create_document("dbs/d/colls/c", "pk1", &serde_json::json!({"id": "x"}), None)
            .await
            .unwrap();
        client
            .read_document("dbs/d/colls/c/docs/x", "pk1", None)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[1].header(headers::SESSION_TOKEN), None);
        assert_eq!(
            sent[1].header(headers::CONSISTENCY_LEVEL),
            Some("Eventual")
        );
    }

    #[tokio::test]
    async fn test_retry_recovers_from_partition_key_mismatch() {
        let transport = Arc::new(
            QueueTransport::new()
                .push(Err(StoreError::service(
                    400,
                    SubStatus::PartitionKeyMismatch,
                    "stale",
                )))
                .push(Ok(StoreResponse::new(201))),
        );
        let client = client_with(transport.clone());

        let response = client
            .create_document("dbs/d/colls/c", "pk1", &serde_json::json!({"id": "x"}), None)
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_error_surfaces_exact_pair() {
        let transport = Arc::new(QueueTransport::new().push(Err(StoreError::service(
            404,
            SubStatus::Unknown,
            "missing",
        ))));
        let client = client_with(transport.clone());

        let error = client
            .read_document("dbs/d/colls/c/docs/x", "pk1", None)
            .await
            .unwrap_err();
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.sub_status(), Some(SubStatus::Unknown));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_reattaches_newest_token() {
        // Attempt 1 fails retriably; a concurrent write advances the
        // partition token before the retry goes out.
        let transport = Arc::new(
            QueueTransport::new()
                .push(Err(StoreError::unreachable("connect refused")))
                .push(Ok(StoreResponse::new(200))),
        );
        let config = ClientConfig::new()
            .with_retry_options(RetryOptions::new(2, Duration::from_millis(100)));
        let client = Arc::new(DocumentStoreClient::new(transport.clone(), config));
        client
            .session()
            .record_response_token("pk1", crate::session::SessionToken::parse("0#1").unwrap());

        let reader = client.clone();
        let read = tokio::spawn(async move {
            reader.read_document("dbs/d/colls/c/docs/x", "pk1", None).await
        });
        // Advance the token while the read sits in its retry backoff.
        tokio::time::sleep(Duration::from_millis(20)).await;
        client
            .session()
            .record_response_token("pk1", crate::session::SessionToken::parse("0#2").unwrap());
        read.await.unwrap().unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].header(headers::SESSION_TOKEN), Some("0#1"));
        assert_eq!(sent[1].header(headers::SESSION_TOKEN), Some("0#2"));
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch() {
        let transport = Arc::new(QueueTransport::new());
        let client = client_with(transport.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = client
            .read_document(
                "dbs/d/colls/c/docs/x",
                "pk1",
                Some(RequestOptions::new().with_cancellation(cancel)),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::Cancelled));
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_scheduled_retries() {
        let transport = Arc::new(
            QueueTransport::new().push(Err(StoreError::unreachable("connect refused"))),
        );
        let config = ClientConfig::new()
            .with_retry_options(RetryOptions::new(5, Duration::from_secs(30)));
        let client = Arc::new(DocumentStoreClient::new(transport.clone(), config));

        let cancel = CancellationToken::new();
        let reader = client.clone();
        let reader_cancel = cancel.clone();
        let pending = tokio::spawn(async move {
            reader
                .read_document(
                    "dbs/d/colls/c/docs/x",
                    "pk1",
                    Some(RequestOptions::new().with_cancellation(reader_cancel)),
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let error = pending.await.unwrap().unwrap_err();
        assert!(matches!(error, StoreError::Cancelled));
        // Only the first attempt went out; the 30s backoff was abandoned.
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_query_carries_continuation_limit_header() {
        let transport = Arc::new(QueueTransport::new());
        let config = ClientConfig::new().with_continuation_token_limit_kb(16);
        let client = DocumentStoreClient::new(transport.clone(), config);

        client
            .query_documents("dbs/d/colls/c", "SELECT * FROM c", Some("pk1"), None)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(
            sent[0].header(headers::CONTINUATION_TOKEN_LIMIT_KB),
            Some("16")
        );
        assert_eq!(sent[0].header(headers::IS_QUERY), Some("true"));
    }

    #[tokio::test]
    async fn test_document_ops_reject_empty_partition_key() {
        let transport = Arc::new(QueueTransport::new());
        let client = client_with(transport.clone());

        let error = client
            .read_document("dbs/d/colls/c/docs/x", "", None)
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::Validation { .. }));
        assert!(transport.sent().is_empty());
    }
}
