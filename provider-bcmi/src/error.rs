//! Error types for the BCMI registry provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// BCMI provider errors
#[derive(Error, Debug)]
pub enum BcmiError {
    /// Registry answered with a non-success status
    #[error("BCMI API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Body was not a JSON array of objects
    #[error("Failed to parse BCMI response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for BCMI operations
pub type Result<T> = std::result::Result<T, BcmiError>;

impl From<BcmiError> for BridgeError {
    fn from(error: BcmiError) -> Self {
        match error {
            BcmiError::ApiError {
                status_code,
                message,
            } => BridgeError::RemoteUnavailable {
                status_code: Some(status_code),
                message,
            },
            BcmiError::ParseError(msg) => BridgeError::MalformedPayload(msg),
            BcmiError::BridgeError(e) => e,
        }
    }
}
