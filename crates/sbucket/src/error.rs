//! Store-wide error type.
//!
//! Every public operation on a shard or table reports one of these kinds.
//! Streams fail terminally: once a reader or writer has surfaced an error it
//! emits no further data, and subsequent use reports [`Error::Cancelled`].

use engine::EngineError;
use keys::BadKey;
use std::io;
use thiserror::Error;

/// Failures surfaced by shard and table operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A textual key that is not 40 lowercase hex characters.
    #[error(transparent)]
    BadKey(#[from] BadKey),

    /// The blob is absent on read.
    #[error("not found")]
    NotFound,

    /// Admission refused or the shard cap reached mid-stream.
    #[error("no space: {needed} bytes needed, {free} bytes free")]
    NoSpace {
        /// Bytes the operation needed to admit.
        needed: u64,
        /// Free bytes the shard reported.
        free: u64,
    },

    /// A filesystem failure; the message carries the underlying cause.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An engine failure; the message carries the underlying cause.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The stream was aborted, or used after a terminal error.
    #[error("stream cancelled")]
    Cancelled,
}

impl Error {
    /// Builds the I/O error reported for a corrupt store: a chunk gap found
    /// during a read, or a malformed reference-id file. Not recovered; the
    /// descriptive message carries the damage.
    pub fn corrupt(msg: String) -> Self {
        Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg))
    }

    /// Converts a poisoned-lock failure into the store error.
    pub fn lock_poisoned(e: impl std::fmt::Display) -> Self {
        Error::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("lock poisoned: {e}"),
        ))
    }

    /// Recovers a store error smuggled through `std::io::Error` by the
    /// `Read`/`Write` adapter impls, so typed kinds survive `io::copy`.
    pub fn from_io(e: io::Error) -> Self {
        match e.downcast::<Error>() {
            Ok(inner) => inner,
            Err(e) => Error::Io(e),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        match e {
            Error::Io(inner) => inner,
            Error::NotFound => io::Error::new(io::ErrorKind::NotFound, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Shorthand used throughout the store crates.
pub type Result<T> = std::result::Result<T, Error>;
