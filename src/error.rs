//! Error types for the Doru library.
//!
//! All fallible operations return [`Result`], whose error type is the
//! [`DoruError`] enum.

use std::io;

use thiserror::Error;

/// The main error type for Doru operations.
#[derive(Error, Debug)]
pub enum DoruError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid argument supplied by the caller (bad query shape, negative
    /// scale factor, invalid pattern).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A wildcard or edit-distance expansion exceeded its term limit.
    #[error("Expansion limit exceeded: {0}")]
    ExpansionLimit(String),

    /// A query composition that the matcher does not support.
    #[error("Not implemented: {0}")]
    Unimplemented(String),

    /// Index-related errors
    #[error("Index error: {0}")]
    Index(String),

    /// Query-related errors
    #[error("Query error: {0}")]
    Query(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic anyhow error
    #[error("Error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<serde_json::Error> for DoruError {
    fn from(error: serde_json::Error) -> Self {
        DoruError::Serialization(error.to_string())
    }
}

/// Result type alias for operations that may fail with [`DoruError`].
pub type Result<T> = std::result::Result<T, DoruError>;

impl DoruError {
    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        DoruError::InvalidArgument(msg.into())
    }

    /// Create a new expansion limit error.
    pub fn expansion_limit<S: Into<String>>(msg: S) -> Self {
        DoruError::ExpansionLimit(msg.into())
    }

    /// Create a new unimplemented error.
    pub fn unimplemented<S: Into<String>>(msg: S) -> Self {
        DoruError::Unimplemented(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        DoruError::Index(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DoruError::Query(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        DoruError::Serialization(msg.into())
    }
}
