//! Error types for the HTTP client.

use thiserror::Error;

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors produced while configuring the client or exchanging requests.
///
/// A response with a non-2xx status is not an error at this layer; callers
/// receive the captured response and decide what the status means.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Client configuration failed validation.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The request could not be sent or its response could not be read.
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A security scheme could not produce credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A response body could not be decoded as JSON.
    #[error("response body is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The body cannot be re-encoded as `application/x-www-form-urlencoded`.
    #[error("body is not form-encodable: {0}")]
    FormEncode(String),

    /// A method string named no HTTP method the client supports.
    #[error("unsupported http method {0:?}")]
    UnsupportedMethod(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// True when the failure happened on the wire rather than in
    /// configuration or encoding.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// True when the operation was cut short by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
