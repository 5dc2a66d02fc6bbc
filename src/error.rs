//! Error types for ocistmt-rs.
//!
//! This module defines domain-specific error types organized by functional area.

use std::fmt;
use thiserror::Error;

/// Top-level error type encompassing all possible errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Driver (collaborator) errors
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Statement lifecycle, binding and fetch errors
    #[error(transparent)]
    Statement(#[from] StatementError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors surfaced by the database driver.
///
/// These are produced by [`Driver`](crate::driver::Driver) implementations and
/// are propagated unmodified through the statement layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The connection is unusable
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQL text could not be parsed into a handle
    #[error("Failed to parse statement: {message}")]
    Parse { sql: String, message: String },

    /// A host variable was rejected
    #[error("Failed to bind '{name}': {message}")]
    Bind { name: String, message: String },

    /// Statement execution failed
    #[error("Execution failed: {0}")]
    Execute(String),

    /// Row fetch failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Column metadata could not be read
    #[error("Metadata query failed for field {index}: {message}")]
    Metadata { index: usize, message: String },

    /// Releasing a handle failed
    #[error("Failed to free statement handle {handle}: {message}")]
    Free { handle: u64, message: String },

    /// Commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The handle is not known to the driver
    #[error("Invalid statement handle {0}")]
    InvalidHandle(u64),
}

/// Errors raised by the statement layer itself.
#[derive(Error, Debug)]
pub enum StatementError {
    /// Failure reported by the driver
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Numeric column references are 1-based
    #[error("Invalid column index {index}: column indices start at 1")]
    InvalidColumnIndex { index: i64 },

    /// Column reference does not match any fetched column
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Operation attempted in a state that does not allow it
    #[error("Statement lifecycle error: {0}")]
    Lifecycle(String),

    /// Malformed bind hint
    #[error("Invalid binding for '{name}': {message}")]
    InvalidBinding { name: String, message: String },

    /// Fetched value could not be converted to the requested type
    #[error("Conversion error: {0}")]
    Conversion(String),
}

/// Errors related to configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration parameter
    #[error("Invalid configuration parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Configuration string parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Coarse error classification, stable across error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Caller supplied an invalid argument
    InvalidArgument,
    /// Operation not allowed in the current state
    InvalidState,
    /// Failure inside the driver
    Driver,
    /// Value conversion failure
    Conversion,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            ErrorCode::InvalidState => write!(f, "INVALID_STATE"),
            ErrorCode::Driver => write!(f, "DRIVER"),
            ErrorCode::Conversion => write!(f, "CONVERSION"),
        }
    }
}

impl Error {
    /// Map to an error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Driver(_) => ErrorCode::Driver,
            Error::Statement(e) => e.code(),
            Error::Config(_) => ErrorCode::InvalidArgument,
        }
    }
}

impl StatementError {
    /// Map to an error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            StatementError::Driver(_) => ErrorCode::Driver,
            StatementError::InvalidColumnIndex { .. }
            | StatementError::UnknownColumn(_)
            | StatementError::InvalidBinding { .. } => ErrorCode::InvalidArgument,
            StatementError::Lifecycle(_) => ErrorCode::InvalidState,
            StatementError::Conversion(_) => ErrorCode::Conversion,
        }
    }

    /// Shorthand for a lifecycle error.
    pub(crate) fn lifecycle(message: impl Into<String>) -> Self {
        StatementError::Lifecycle(message.into())
    }
}

impl From<serde_json::Error> for StatementError {
    fn from(err: serde_json::Error) -> Self {
        StatementError::Conversion(err.to_string())
    }
}
