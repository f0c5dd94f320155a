//! # Host Bridge Traits
//!
//! Capability traits the sync pipeline depends on but does not implement.
//!
//! ## Overview
//!
//! This crate defines the contract between the pipeline core and the concrete
//! adapters (desktop `reqwest` transport, registry connectors, host loggers).
//! Each trait is a seam that tests replace with mocks.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry policy and bearer auth
//! - [`RegistrySource`](registry::RegistrySource) - Read-only access to a remote registry
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Adapters should:
//!
//! - Classify non-2xx responses and transport failures as `RemoteUnavailable`
//! - Classify unparseable bodies as `MalformedPayload`
//! - Include context (endpoint, status code) in messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared as
//! `Arc<dyn Trait>` across async tasks.

pub mod error;
pub mod http;
pub mod registry;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use registry::{RawRecord, RegistrySource};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
