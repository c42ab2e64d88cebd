//! Error types for the mock API.

use thiserror::Error;

/// Errors surfaced to code that drives the mock API.
///
/// Unmatched requests, failed body validation and exhausted limits are not
/// errors; they are answered with a 404 response instead.
#[derive(Debug, Error)]
pub enum MockError {
    /// The method token is not one of the supported HTTP verbs.
    #[error("'{0}' is not a valid HTTP method")]
    InvalidMethod(String),

    /// The path pattern could not be compiled.
    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPath {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The expectation is not part of this mock API.
    #[error("this expectation does not exist in this mock API")]
    NotRegistered,

    /// A JSON response body could not be serialized.
    #[error("failed to serialize JSON response: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The listener is already running.
    #[error("mock API is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
