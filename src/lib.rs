//! # Document Store Client
//!
//! An async client for a partitioned document store with session-level
//! consistency and bounded retry.
//!
//! ## Overview
//!
//! The client tracks, per logical partition, the newest session token the
//! server has returned, and attaches it to subsequent document-level
//! requests so a session always reads its own writes. Failed requests are
//! retried under an explicit policy: connectivity failures, stale
//! partition metadata, and throttling are retried within a fixed budget;
//! everything else surfaces to the caller immediately with the exact
//! status/sub-status pair the server sent.
//!
//! ### Key Features
//!
//! - **Session consistency**: per-partition session tokens are harvested
//!   from responses and re-attached to eligible requests automatically.
//!   Control-plane (master) resources never carry a token.
//! - **Bounded retry**: a [`RetryPolicy`] grants each logical operation
//!   its own [`RetrySession`]; retriable failures back off a fixed
//!   interval (or the server's throttling hint) up to a configured
//!   attempt budget.
//! - **Pluggable transport**: the wire is behind the [`StoreTransport`]
//!   trait. Production uses the reqwest-based [`GatewayTransport`]; tests
//!   swap in a mock.
//! - **Cancellation**: operations accept a `CancellationToken`; a
//!   cancelled operation stops scheduling retries and never writes a late
//!   response's token into shared session state.
//!
//! ## Getting Started
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docstore_client::{ClientConfig, DocumentStoreClient, GatewayTransport};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Order {
//!     id: String,
//!     amount: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), docstore_client::StoreError> {
//!     let transport = Arc::new(GatewayTransport::new("https://store.example.com"));
//!     let client = DocumentStoreClient::new(transport, ClientConfig::default());
//!
//!     let order = Order { id: "o-1".into(), amount: 9.5 };
//!     client.create_document("dbs/shop/colls/orders", "o-1", &order, None).await?;
//!
//!     // Session consistency: this read observes the write above.
//!     let response = client
//!         .read_document("dbs/shop/colls/orders/docs/o-1", "o-1", None)
//!         .await?;
//!     println!("status {}", response.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Consistency and Session Tokens
//!
//! Under [`ConsistencyLevel::Session`] (the default), every successful
//! response for a partitioned document carries a session token. The
//! client keeps the newest token per partition in a [`SessionContainer`]
//! and attaches it to later document-level requests for the same
//! partition. Tokens are opaque and monotonically comparable; an older
//! token observed out of order never replaces a newer stored one.
//!
//! Master resources (databases, collections) are control-plane metadata:
//! requests for them never carry the session-token header, in any
//! connection mode.
//!
//! ## Retry Behavior
//!
//! [`FixedIntervalRetryPolicy`] classifies each failure:
//!
//! - **Connectivity** (host unreachable, timeout): retriable
//! - **Partition key mismatch** (stale collection metadata): retriable,
//!   with a metadata-refresh hook before the next attempt
//! - **Throttling** (HTTP 429): retriable, sleeping the server's
//!   retry-after hint when present
//! - **Everything else**: terminal on first occurrence, no added delay
//!
//! A fully exhausted retriable sequence sleeps at least
//! `max_retry_count * retry_interval` in total. Backoff suspends only the
//! operation awaiting retry; other operations on the same client proceed.
//!
//! ## Module Organization
//!
//! - [`client`]: the [`DocumentStoreClient`] entry point and dispatch path
//! - [`config`]: client-wide configuration and per-call options
//! - [`error`]: error taxonomy ([`StoreError`], [`SubStatus`])
//! - [`headers`]: wire header name constants
//! - [`request`]: request/response types handed to the transport
//! - [`retry`]: retry policy, session, and decision types
//! - [`session`]: session token parsing and the per-partition container
//! - [`transport`]: the transport trait and the gateway implementation

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod request;
pub mod retry;
pub mod session;
pub mod transport;

pub use client::{DocumentStoreClient, DocumentStoreClientBuilder, MetadataRefresher};
pub use config::{
    ClientConfig, ConnectionMode, ConsistencyLevel, RequestOptions, RetryOptions,
};
pub use error::{StoreError, SubStatus};
pub use request::{OperationKind, RequestContext, ResourceType, StoreResponse};
pub use retry::{
    ErrorClass, FixedIntervalRetryPolicy, RetryDecision, RetryPolicy, RetrySession, RetryState,
    DEFAULT_MAX_RETRY_COUNT, DEFAULT_RETRY_INTERVAL,
};
pub use session::{SessionContainer, SessionToken};
pub use transport::{GatewayTransport, SharedStoreTransport, StoreTransport};
