//! Error types for logbench.

use crate::sequence::Sequence;
use std::io;

/// The result type used throughout logbench.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for storage and harness operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while opening, syncing, compacting or closing.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A value could not be encoded or decoded by the configured codec.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The sequence counter could not be read or advanced.
    #[error("Sequence allocation failed: {0}")]
    SequenceAllocation(String),

    /// The requested sequence was never assigned.
    #[error("Sequence {0} not found")]
    NotFound(Sequence),

    /// The engine failed to begin, commit or roll back a transaction.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored data failed validation.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The storage instance or harness is in an invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An error annotated with the operation that produced it.
    #[error("{op}: {source}")]
    Context {
        /// Name of the failing operation.
        op: &'static str,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Creates a new codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new transaction error.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Error::Transaction(msg.into())
    }

    /// Wraps this error with the name of the failing operation.
    pub fn context(self, op: &'static str) -> Self {
        Error::Context { op, source: Box::new(self) }
    }

    /// Returns the innermost error, skipping any context layers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if this error reports an unassigned sequence.
    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Error::NotFound(_))
    }
}

/// Adds operation context to results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with the name of the failing operation.
    fn context(self, op: &'static str) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, op: &'static str) -> Result<T> {
        self.map_err(|e| e.into().context(op))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<redb::Error> for Error {
    fn from(err: redb::Error) -> Self {
        match err {
            redb::Error::Io(e) => Error::Io(e),
            redb::Error::Corrupted(msg) => Error::Corruption(msg),
            other => Error::Transaction(other.to_string()),
        }
    }
}

macro_rules! from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Error {
                fn from(err: $ty) -> Self {
                    redb::Error::from(err).into()
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        match err {
            sled::Error::Io(e) => Error::Io(e),
            corrupted @ sled::Error::Corruption { .. } => Error::Corruption(corrupted.to_string()),
            other => Error::Transaction(other.to_string()),
        }
    }
}
