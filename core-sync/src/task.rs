//! Operator task descriptors.
//!
//! A task names the data source to import from and what to do with it. The
//! BCMI source imports every record kind, so `recordType` is optional.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Result, SyncError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub data_source_type: String,
    pub task_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
}

impl TaskDescriptor {
    /// Validate a raw request body.
    ///
    /// Mirrors the job interface: a missing body or a missing mandatory field
    /// is reported by name.
    pub fn from_request(body: Option<&Value>) -> Result<Self> {
        let body = match body {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => return Err(SyncError::InvalidTask("missing required request body".to_string())),
        };

        let field = |name: &str| -> Result<String> {
            body.get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| SyncError::InvalidTask(format!("missing required {}", name)))
        };

        Ok(Self {
            data_source_type: field("dataSourceType")?,
            task_type: field("taskType")?,
            record_type: field("recordType").ok(),
        })
    }

    /// Whether this task targets the given data source (case-insensitive).
    pub fn targets(&self, data_source: &str) -> bool {
        self.data_source_type.eq_ignore_ascii_case(data_source)
    }
}
