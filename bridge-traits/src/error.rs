use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote endpoint answered with a non-success status, or could not
    /// be reached at all (`status_code` is `None` for transport failures).
    #[error("Remote unavailable (status {status_code:?}): {message}")]
    RemoteUnavailable {
        status_code: Option<u16>,
        message: String,
    },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl BridgeError {
    /// HTTP status attached to a remote failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            BridgeError::RemoteUnavailable { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
