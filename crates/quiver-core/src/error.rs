//! Crate-wide error type
//!
//! Every recoverable failure in the core maps to one of seven kinds. The
//! diagnostic string carries the offending label, local id, or axis so the
//! caller can log it without re-deriving context.
//!
//! Lifecycle violations (using an uninitialized id manager, writing the
//! reserved range through the normal path) are programmer errors and panic
//! instead of returning.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A parameter is outside its closed domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A label or registry cell is already populated.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A label or local id has no mapping.
    #[error("not found: {0}")]
    NotFound(String),

    /// A local id falls outside the configured bounds or backing storage.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// The id pool is full and growth is not permitted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Allocation failed or no kernel is registered for the combination.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// An operation arrived after a lifecycle boundary (e.g. registry freeze).
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub fn already_exists(msg: impl Into<String>) -> Self {
        Error::AlreadyExists(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Error::OutOfRange(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Error::ResourceExhausted(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::Unavailable(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Error::FailedPrecondition(msg.into())
    }
}
