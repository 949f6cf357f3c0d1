//! Errors for `pnacl-streaming`.

use thiserror::Error as ThisError;

/// Potential errors when streaming bytes.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum Error {
    /// The underlying data source failed.
    #[error("I/O error while streaming: {0}")]
    Io(#[from] std::io::Error),
    /// Fewer bytes than were known to be available came back from a read.
    #[error("short read at {addr}: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// The address the read started at.
        addr: u64,
        /// The number of bytes the stream promised.
        expected: usize,
        /// The number of bytes actually read.
        actual: usize,
    },
    /// More leading bytes were dropped than have been read.
    #[error("can't drop {requested} leading bytes: only {available} have been read")]
    DropPastRead {
        /// The number of bytes asked to be dropped.
        requested: u64,
        /// The number of bytes read so far.
        available: u64,
    },
    /// A function queue was created without any threads to serve.
    #[error("a function queue needs at least one thread")]
    NoThreads,
}
