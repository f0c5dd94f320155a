//! # BCMI Registry Provider
//!
//! Implements `RegistrySource` for the BC mines registry.
//!
//! ## Overview
//!
//! This crate provides:
//! - `GET /api/projects/published` for the mine list
//! - `GET /api/collections/project/{code}` for a mine's collections
//! - Classification of failures into `RemoteUnavailable` and `MalformedPayload`
//!
//! It never retries and never writes locally.

pub mod connector;
pub mod error;

pub use connector::{BcmiConnector, BCMI_BASE_URL};
pub use error::{BcmiError, Result};
