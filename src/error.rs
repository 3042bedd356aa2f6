//! Crate-wide error type and result alias.
//!
//! Every fallible operation in the engine returns [`Result`], carrying an
//! [`Error`] that identifies one of five kinds: `NotFound`, `Corruption`,
//! `Io`, `NotSupported`, or `InvalidArgument`. The engine inspects the
//! kind across module boundaries — corruption in a trailing WAL record is
//! tolerated during recovery, a background I/O failure poisons subsequent
//! writes — so a single enum is used instead of per-module error types.

use std::io;

use thiserror::Error;

/// Errors produced by any engine operation.
#[derive(Debug, Error)]
pub enum Error {
    /// A lookup missed, or an expected file is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Checksum mismatch, malformed record, bad magic, unknown
    /// compression, or any other integrity failure.
    #[error("corruption: {0}")]
    Corruption(String),

    /// Underlying filesystem or OS call failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested feature is unavailable in this build or environment.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Caller misuse — empty database name, invalid option combination.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Shorthand constructor for [`Error::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Shorthand constructor for [`Error::Corruption`].
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Shorthand constructor for [`Error::NotSupported`].
    pub fn not_supported(msg: impl Into<String>) -> Self {
        Error::NotSupported(msg.into())
    }

    /// Shorthand constructor for [`Error::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// True when this error is a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True when this error is an integrity failure.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    /// True when this error originated from the OS.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::NotFound(m) => Error::NotFound(m.clone()),
            Error::Corruption(m) => Error::Corruption(m.clone()),
            // io::Error is not Clone; preserve kind and message.
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::NotSupported(m) => Error::NotSupported(m.clone()),
            Error::InvalidArgument(m) => Error::InvalidArgument(m.clone()),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
