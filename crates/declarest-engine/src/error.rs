//! Engine errors and their stable classification.

use std::fmt;

use declarest_client::ClientError;
use declarest_core::CoreError;
use thiserror::Error;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Machine-readable classification of engine failures.
///
/// The string forms are stable: hosts key retry and surfacing decisions on
/// them, so they never change spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidExpression,
    MissingBodyPath,
    UnknownFunction,
    HttpTransport,
    HttpStatus,
    NotFound,
    PollUnexpectedStatus,
    PollFailedStatus,
    InvalidRetryAfter,
    PreconditionAlreadyExists,
    Cancelled,
    ConfigInvalid,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidExpression => "invalid-expression",
            ErrorKind::MissingBodyPath => "missing-body-path",
            ErrorKind::UnknownFunction => "unknown-function",
            ErrorKind::HttpTransport => "http-transport",
            ErrorKind::HttpStatus => "http-status",
            ErrorKind::NotFound => "not-found",
            ErrorKind::PollUnexpectedStatus => "poll-unexpected-status",
            ErrorKind::PollFailedStatus => "poll-failed-status",
            ErrorKind::InvalidRetryAfter => "invalid-retry-after",
            ErrorKind::PreconditionAlreadyExists => "precondition-already-exists",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ConfigInvalid => "config-invalid",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by reconciler operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// The remote answered with a status the operation cannot accept.
    #[error("{context} at {url} returned status {status}: {detail}")]
    UnexpectedStatus {
        context: &'static str,
        url: String,
        status: u16,
        detail: String,
    },

    /// The resource does not exist on the remote.
    #[error("resource not found at {url}")]
    NotFound { url: String },

    /// A poll response reported a status that is neither the success nor a
    /// pending sentinel.
    #[error("poll at {url} reported unexpected status {status:?}")]
    PollUnexpectedStatus { url: String, status: String },

    /// A poll request itself came back non-2xx.
    #[error("poll at {url} failed with http status {status}")]
    PollFailedStatus { url: String, status: u16 },

    /// A Retry-After header was present but not an integer.
    #[error("unparseable Retry-After value {value:?}")]
    InvalidRetryAfter { value: String },

    /// Create-by-PUT found the resource already present.
    #[error("resource already exists at {url}")]
    AlreadyExists { url: String },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Engine configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EngineError {
    /// The stable classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(core) => match core {
                CoreError::InvalidAttrPath { .. } => ErrorKind::ConfigInvalid,
                CoreError::InvalidExpression { .. } => ErrorKind::InvalidExpression,
                CoreError::MissingBodyPath { .. } => ErrorKind::MissingBodyPath,
                CoreError::UnknownFunction { .. } => ErrorKind::UnknownFunction,
            },
            EngineError::Client(client) => match client {
                ClientError::InvalidConfig(_)
                | ClientError::FormEncode(_)
                | ClientError::UnsupportedMethod(_) => ErrorKind::ConfigInvalid,
                ClientError::Transport(_) | ClientError::Auth(_) | ClientError::Json(_) => {
                    ErrorKind::HttpTransport
                }
                ClientError::Cancelled => ErrorKind::Cancelled,
            },
            EngineError::UnexpectedStatus { .. } => ErrorKind::HttpStatus,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::PollUnexpectedStatus { .. } => ErrorKind::PollUnexpectedStatus,
            EngineError::PollFailedStatus { .. } => ErrorKind::PollFailedStatus,
            EngineError::InvalidRetryAfter { .. } => ErrorKind::InvalidRetryAfter,
            EngineError::AlreadyExists { .. } => ErrorKind::PreconditionAlreadyExists,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::InvalidConfig(_) => ErrorKind::ConfigInvalid,
        }
    }

    /// True when the operation stopped because its token fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        let expected = [
            (ErrorKind::InvalidExpression, "invalid-expression"),
            (ErrorKind::MissingBodyPath, "missing-body-path"),
            (ErrorKind::UnknownFunction, "unknown-function"),
            (ErrorKind::HttpTransport, "http-transport"),
            (ErrorKind::HttpStatus, "http-status"),
            (ErrorKind::NotFound, "not-found"),
            (ErrorKind::PollUnexpectedStatus, "poll-unexpected-status"),
            (ErrorKind::PollFailedStatus, "poll-failed-status"),
            (ErrorKind::InvalidRetryAfter, "invalid-retry-after"),
            (
                ErrorKind::PreconditionAlreadyExists,
                "precondition-already-exists",
            ),
            (ErrorKind::Cancelled, "cancelled"),
            (ErrorKind::ConfigInvalid, "config-invalid"),
        ];
        for (kind, text) in expected {
            assert_eq!(kind.as_str(), text);
            assert_eq!(kind.to_string(), text);
        }
    }

    #[test]
    fn wrapped_errors_classify_through() {
        let core: EngineError = CoreError::UnknownFunction {
            name: "frob".to_string(),
        }
        .into();
        assert_eq!(core.kind(), ErrorKind::UnknownFunction);

        let client: EngineError = ClientError::Cancelled.into();
        assert_eq!(client.kind(), ErrorKind::Cancelled);
        assert!(client.is_cancelled());

        let status = EngineError::UnexpectedStatus {
            context: "create",
            url: "/things".to_string(),
            status: 500,
            detail: String::new(),
        };
        assert_eq!(status.kind(), ErrorKind::HttpStatus);
    }
}
