//! Shared test fixtures for integration tests.
//!
//! Provides two transports: [`MockTransport`] returns queued responses in
//! FIFO order and records every request for verification;
//! [`SimulatedStoreTransport`] behaves like a tiny session-consistent
//! server, bumping a per-partition sequence number on writes and echoing
//! the current one on reads.

#![allow(dead_code)] // Utilities are shared across integration test files

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use docstore_client::headers;
use docstore_client::{RequestContext, StoreError, StoreResponse, StoreTransport};

/// Queued-response transport: returns configured responses in FIFO order
/// and records every request sent through it.
///
/// Once all configured responses are consumed, returns a default 200
/// response.
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<StoreResponse, StoreError>>>,
    sent: Mutex<Vec<RequestContext>>,
}

impl MockTransport {
    /// Creates a mock with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Adds a response to be returned. Responses are consumed FIFO.
    pub fn with_response(self, response: Result<StoreResponse, StoreError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Adds `count` default 200 responses.
    pub fn with_ok_responses(self, count: usize) -> Self {
        let mut responses = self.responses.lock().unwrap();
        for _ in 0..count {
            responses.push_back(Ok(StoreResponse::new(200)));
        }
        drop(responses);
        self
    }

    /// Returns all requests sent through this transport, in order.
    pub fn sent_requests(&self) -> Vec<RequestContext> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the number of requests sent.
    pub fn request_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Clears recorded requests.
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreTransport for MockTransport {
    async fn send(&self, request: RequestContext) -> Result<StoreResponse, StoreError> {
        self.sent.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StoreResponse::new(200)))
    }
}

/// Minimal session-consistent server: document writes bump the target
/// partition's sequence number and return it as a session token; document
/// reads echo the current one. Master-resource operations succeed without
/// a token, as the real gateway does.
pub struct SimulatedStoreTransport {
    lsns: Mutex<HashMap<String, u64>>,
    sent: Mutex<Vec<RequestContext>>,
}

impl SimulatedStoreTransport {
    /// Creates a simulated server with all partitions at sequence zero.
    pub fn new() -> Self {
        Self {
            lsns: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Returns all requests sent through this transport, in order.
    pub fn sent_requests(&self) -> Vec<RequestContext> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the number of requests sent.
    pub fn request_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Clears recorded requests.
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Returns the current sequence number for a partition.
    pub fn current_lsn(&self, partition: &str) -> Option<u64> {
        self.lsns.lock().unwrap().get(partition).copied()
    }
}

impl Default for SimulatedStoreTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreTransport for SimulatedStoreTransport {
    async fn send(&self, request: RequestContext) -> Result<StoreResponse, StoreError> {
        self.sent.lock().unwrap().push(request.clone());

        if request.is_master_resource() {
            let status = match request.operation {
                docstore_client::OperationKind::Create => 201,
                _ => 200,
            };
            return Ok(StoreResponse::new(status));
        }

        let partition = request
            .partition_id
            .clone()
            .unwrap_or_else(|| "<cross-partition>".to_string());
        let mut lsns = self.lsns.lock().unwrap();

        if request.operation.is_write() {
            let lsn = *lsns.entry(partition).and_modify(|l| *l += 1).or_insert(1);
            let status = match request.operation {
                docstore_client::OperationKind::Create => 201,
                docstore_client::OperationKind::Delete => 204,
                _ => 200,
            };
            Ok(StoreResponse::new(status)
                .with_header(headers::SESSION_TOKEN, format!("0#{lsn}")))
        } else {
            let mut response = StoreResponse::new(200);
            if let Some(lsn) = lsns.get(&partition) {
                response = response.with_header(headers::SESSION_TOKEN, format!("0#{lsn}"));
            }
            Ok(response)
        }
    }
}
