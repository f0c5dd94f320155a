//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for server and desktop hosts.
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::with_timeout(Duration::from_secs(60))?);
//! let connector = BcmiConnector::new(http_client, "https://mines.empr.gov.bc.ca");
//! ```

mod http;

pub use http::ReqwestHttpClient;
