//! Error types for the core algorithms.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced by attribute-path parsing, expression expansion, and
/// body handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An attribute path string failed to parse.
    #[error("invalid attribute path {path:?}: {reason}")]
    InvalidAttrPath { path: String, reason: String },

    /// An expansion template is malformed or references something that
    /// cannot be resolved.
    #[error("invalid expression {template:?}: {reason}")]
    InvalidExpression { template: String, reason: String },

    /// A `body` reference pointed at a property the body does not have.
    #[error("no property found at path {path:?} in the body")]
    MissingBodyPath { path: String },

    /// An expansion function chain named a function that does not exist.
    #[error("unknown function {name:?}")]
    UnknownFunction { name: String },
}

impl CoreError {
    /// True when the error stems from a `body` reference that found nothing.
    #[must_use]
    pub fn is_missing_body_path(&self) -> bool {
        matches!(self, CoreError::MissingBodyPath { .. })
    }
}
