//! Stable error taxonomy surfaced at the index façade boundary.
//!
//! Every caller-visible operation returns one of the variants below rather
//! than a component-internal error type. Internal-invariant violations
//! (heap corruption, a desynchronized id-map, an unreachable branch in
//! traversal) are never represented here — they abort via
//! [`crate::panic_if`] instead, matching the "fatal, never recoverable"
//! class of condition.

use thiserror::Error;

/// Stable, embedder-facing error codes.
///
/// Variant names and the set itself are part of the persisted contract of
/// this crate: embedders may match on them and can expect the set not to
/// shrink or be renumbered within a major version.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A handle or index was not properly initialized.
    #[error("index not initialized")]
    InvalidInit,

    /// The index handle itself is invalid (e.g. used after destroy).
    #[error("invalid index handle")]
    InvalidIndex,

    /// The supplied vector payload is malformed (wrong length, non-finite values).
    #[error("invalid vector payload")]
    InvalidVector,

    /// A result buffer or structure was invalid.
    #[error("invalid result buffer")]
    InvalidResult,

    /// `dims` of the supplied vector does not match the index's configured dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    InvalidDimensions {
        /// Dimensionality the index was configured with.
        expected: u32,
        /// Dimensionality actually supplied.
        actual: u32,
    },

    /// A caller-supplied argument was out of range or otherwise malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An unknown or unsupported index kind was requested.
    #[error("invalid index type")]
    InvalidIndexType,

    /// `id == 0`, the reserved "no id" sentinel.
    #[error("invalid id: 0 is reserved")]
    InvalidId,

    /// A reference (e.g. entry point, neighbor slot) pointed outside the arena.
    #[error("invalid internal reference")]
    InvalidRef,

    /// An unknown distance metric code was requested.
    #[error("invalid metric")]
    InvalidMethod,

    /// `insert` was called with an id already present in the index.
    #[error("duplicated entry: id {0} already exists")]
    DuplicatedEntry(u64),

    /// `delete` or a lookup was called with an id not present in the index.
    #[error("id not found: {0}")]
    NotFoundId(u64),

    /// `search` was called against an index with zero elements.
    #[error("index is empty")]
    IndexEmpty,

    /// The per-index lock could not be acquired (poisoned by a panicking holder).
    #[error("thread/lock error")]
    ThreadError,

    /// An allocation or other system-level failure occurred; the operation was rolled back.
    #[error("system error: {0}")]
    SystemError(String),

    /// An I/O error occurred while reading or writing a persistence file.
    #[error("file io error: {0}")]
    FileIoError(String),

    /// The requested operation is not implemented for this index kind/configuration.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// The file being loaded/imported is not a recognized or supported format.
    #[error("invalid file format: {0}")]
    InvalidFile(String),
}

impl IndexError {
    /// The stable human-readable code name for this error, independent of
    /// the `Display` message (which may carry situational detail).
    #[must_use]
    pub fn code_name(&self) -> &'static str {
        match self {
            IndexError::InvalidInit => "InvalidInit",
            IndexError::InvalidIndex => "InvalidIndex",
            IndexError::InvalidVector => "InvalidVector",
            IndexError::InvalidResult => "InvalidResult",
            IndexError::InvalidDimensions { .. } => "InvalidDimensions",
            IndexError::InvalidArgument(_) => "InvalidArgument",
            IndexError::InvalidIndexType => "InvalidIndexType",
            IndexError::InvalidId => "InvalidId",
            IndexError::InvalidRef => "InvalidRef",
            IndexError::InvalidMethod => "InvalidMethod",
            IndexError::DuplicatedEntry(_) => "DuplicatedEntry",
            IndexError::NotFoundId(_) => "NotFoundId",
            IndexError::IndexEmpty => "IndexEmpty",
            IndexError::ThreadError => "ThreadError",
            IndexError::SystemError(_) => "SystemError",
            IndexError::FileIoError(_) => "FileIoError",
            IndexError::NotImplemented(_) => "NotImplemented",
            IndexError::InvalidFile(_) => "InvalidFile",
        }
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::FileIoError(e.to_string())
    }
}

/// Result alias used throughout the public API.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Aborts the process with a diagnostic when an internal invariant is
/// violated. Internal-invariant violations are never recoverable errors:
/// heap corruption, id-map/graph desynchronization, or an unreachable
/// traversal branch indicate a bug in this library, not a runtime
/// condition the caller can act on.
#[macro_export]
macro_rules! panic_if {
    ($cond:expr, $($arg:tt)+) => {
        if $cond {
            panic!($($arg)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_names_are_stable_strings() {
        assert_eq!(IndexError::IndexEmpty.code_name(), "IndexEmpty");
        assert_eq!(
            IndexError::DuplicatedEntry(7).code_name(),
            "DuplicatedEntry"
        );
    }

    #[test]
    fn io_error_converts_to_file_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: IndexError = io_err.into();
        assert!(matches!(err, IndexError::FileIoError(_)));
    }
}
