//! Error management for `pnacl-bitcursor`.

use thiserror::Error as ThisError;

/// All errors potentially produced by `pnacl-bitcursor` APIs.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum Error {
    /// A read ran off the end of the inner buffer.
    #[error("EOF while reading")]
    Eof,
    /// [`BitCursor::new_with_len`](crate::BitCursor::new_with_len) was given a length
    /// larger than its buffer.
    #[error("invalid length for buffer supplied to cursor")]
    InvalidLength,
    /// A value did not fit into the scalar type it was read into.
    #[error("loss of data with cast")]
    BadCast,
    /// A read or write was requested with a bit width of zero, or of 64 and above.
    #[error("invalid bit width for read or write: {0}")]
    InvalidWidth(usize),
    /// A VBR read or write was requested with a chunk width outside of `2..=32`.
    #[error("invalid VBR width: {0}")]
    InvalidVbrWidth(usize),
    /// A VBR-encoded value has more chunks than fit into 64 bits.
    #[error("VBR value overflows 64 bits")]
    VbrOverflow,
    /// A value handed to the writer has bits set above the requested width.
    #[error("value {value:#x} does not fit in {width} bits")]
    ValueTooWide {
        /// The offending value.
        value: u64,
        /// The requested width.
        width: usize,
    },
    /// A backpatch was requested outside of the bytes written so far.
    #[error("cannot backpatch word at byte {0}")]
    BadBackpatch(usize),
    /// The inner buffer ended in the middle of a read.
    #[error("too little data to service request")]
    Short,
}
