//! Error types for fileharbor-client

use thiserror::Error;

use crate::status::ErrorMessage;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request failed; the message has already been published on the status board
    #[error("Request failed: {}", .0.details.join(", "))]
    Request(ErrorMessage),

    /// The search session was replaced or cancelled before it finished
    #[error("Search superseded by a newer session")]
    Superseded,

    /// The server answered with a body that is neither a job nor a result
    #[error("Invalid search reply: {0}")]
    InvalidReply(String),
}

impl ClientError {
    /// Normalized error tokens, if this error came from a failed request
    pub fn details(&self) -> Option<&[String]> {
        match self {
            ClientError::Request(message) => Some(&message.details),
            _ => None,
        }
    }
}
