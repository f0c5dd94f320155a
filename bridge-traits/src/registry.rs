//! Remote Registry Abstraction
//!
//! A registry is an external authority's HTTP API that publishes hierarchical
//! records (projects/mines, their collections, and collection documents).
//! Connectors implement [`RegistrySource`]; the sync pipeline only sees
//! [`RawRecord`] payloads and the error classification below.
//!
//! # Errors
//!
//! - [`BridgeError::RemoteUnavailable`](crate::error::BridgeError::RemoteUnavailable)
//!   for non-2xx responses and transport failures
//! - [`BridgeError::MalformedPayload`](crate::error::BridgeError::MalformedPayload)
//!   when the body is not a JSON array of objects
//!
//! Connectors never retry; retry cadence belongs to whatever schedules the run.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::Result;

/// Endpoint listing every published project in the registry.
pub const PUBLISHED_PROJECTS_ENDPOINT: &str = "/api/projects/published";

/// Endpoint prefix for the collections of a single project.
pub const PROJECT_COLLECTIONS_ENDPOINT: &str = "/api/collections/project";

/// One opaque payload returned by a registry.
///
/// The payload is kept as-is; field selection happens in the mapper.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub payload: Map<String, Value>,
}

impl RawRecord {
    pub fn new(payload: Map<String, Value>) -> Self {
        Self { payload }
    }

    /// Remote identifier, read from `id` or `_id` (string or number).
    pub fn remote_id(&self) -> Option<String> {
        remote_id_of(&self.payload)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

impl TryFrom<Value> for RawRecord {
    type Error = Value;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(payload) => Ok(Self { payload }),
            other => Err(other),
        }
    }
}

/// Remote identifier of a payload object: `id`, then `_id`.
pub fn remote_id_of(payload: &Map<String, Value>) -> Option<String> {
    ["id", "_id"]
        .iter()
        .filter_map(|key| payload.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Read-only access to a remote registry.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch every record behind `endpoint`.
    ///
    /// Callers must not rely on ordering across pages.
    async fn fetch(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Vec<RawRecord>>;

    /// All published projects (mines).
    async fn published_projects(&self) -> Result<Vec<RawRecord>> {
        self.fetch(PUBLISHED_PROJECTS_ENDPOINT, &[]).await
    }

    /// Collections belonging to the project identified by `code`.
    async fn project_collections(&self, code: &str) -> Result<Vec<RawRecord>> {
        let endpoint = format!(
            "{}/{}",
            PROJECT_COLLECTIONS_ENDPOINT,
            urlencoding::encode(code)
        );
        self.fetch(&endpoint, &[]).await
    }
}
