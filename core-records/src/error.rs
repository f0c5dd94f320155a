use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    /// A field the mapping rule marks mandatory is absent or blank.
    #[error("Unmappable {record_type} record: missing mandatory field '{field}'")]
    UnmappableRecord { record_type: String, field: String },

    #[error("Invalid mapping rule: {0}")]
    InvalidRule(String),

    #[error("Invalid schema kind: {0}")]
    InvalidKind(String),
}

impl MappingError {
    pub fn unmappable(record_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::UnmappableRecord {
            record_type: record_type.into(),
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
