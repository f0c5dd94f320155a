use bridge_traits::error::BridgeError;
use core_records::MappingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote registry unavailable (status {status_code:?}): {message}")]
    RemoteUnavailable {
        status_code: Option<u16>,
        message: String,
    },

    #[error("Malformed registry payload: {0}")]
    MalformedPayload(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Record {kind}:{original_id} is already staged")]
    DuplicateRecord { kind: String, original_id: String },

    #[error("Failed to stage {kind}:{original_id}: {message}")]
    StagingWriteFailure {
        kind: String,
        original_id: String,
        message: String,
    },

    #[error("Repository rejected record (status {status_code}): {message}")]
    RepositoryRejected { status_code: u16, message: String },

    #[error("Repository unavailable (status {status_code:?}): {message}")]
    RepositoryUnavailable {
        status_code: Option<u16>,
        message: String,
    },

    #[error("Flag {flag} does not apply to {kind} records")]
    InvalidFlag { flag: String, kind: String },

    #[error("Staged record {0} not found")]
    RecordNotFound(String),

    #[error("Sync run {run_id} not found")]
    RunNotFound { run_id: String },

    #[error("Invalid run ID: {0}")]
    InvalidRunId(String),

    #[error("Invalid run status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Sync timeout after {0} seconds")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl SyncError {
    /// Errors that mean local state cannot be read or written; these abort
    /// the run instead of skipping one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Database(_) | SyncError::Config(_))
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::RemoteUnavailable {
                status_code,
                message,
            } => SyncError::RemoteUnavailable {
                status_code,
                message,
            },
            BridgeError::MalformedPayload(message) => SyncError::MalformedPayload(message),
            other => SyncError::RemoteUnavailable {
                status_code: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Database(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
