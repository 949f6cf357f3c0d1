//! Errors for `pnacl-compress`.

use thiserror::Error as ThisError;

/// Potential errors when analyzing or compressing a bitcode file.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The input isn't a whole number of 32-bit words.
    #[error("bitcode size ({0}) is not a multiple of 4")]
    BadSize(usize),
    /// Reading or writing the underlying bitstream failed.
    #[error("bitstream error: {0}")]
    Bitstream(#[from] pnacl_bitstream::Error),
    /// The bitstream is well-formed, but its block structure isn't.
    #[error("error while unrolling the bitstream: {0}")]
    Unroll(String),
    /// A record refers to an abbreviation that its block never defined.
    #[error("bad abbreviation index {index} in block {block_id}")]
    BadAbbrevIndex {
        /// The block the record appears in.
        block_id: u64,
        /// The bitstream abbreviation ID the record was read with.
        index: u64,
    },
    /// Writing analysis output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
