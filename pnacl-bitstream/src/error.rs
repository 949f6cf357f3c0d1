//! Errors for `pnacl-bitstream`.

use num_enum::TryFromPrimitiveError;
use pnacl_bitcursor::error::Error as CursorError;
use pnacl_support::bitcodes::{AbbrevOpEnc, BlockInfoCode};
use thiserror::Error as ThisError;

/// All possible errors that can occur while reading or writing a bitstream.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The underlying bitstream has no more data to parse.
    #[error("bitstream has been exhausted")]
    Exhausted,
    /// The underlying cursor or writer failed.
    #[error("underlying bitcursor error: {0}")]
    Cursor(#[from] CursorError),
    /// The PEXE header in front of the bitstream is missing or malformed.
    #[error("couldn't parse PEXE header: {0}")]
    BadHeader(String),
    /// A record in the `BLOCKINFO` block has a code that we don't know.
    #[error("bad record code for BLOCKINFO block")]
    BadBlockInfoCode(#[from] TryFromPrimitiveError<BlockInfoCode>),
    /// An operand in a `DEFINE_ABBREV` definition has an encoding that we don't know.
    #[error("bad operand code for DEFINE_ABBREV operand")]
    BadAbbrevOpEnc(#[from] TryFromPrimitiveError<AbbrevOpEnc>),
    /// A generic error occurred while parsing the bitstream.
    #[error("error while parsing stream: {0}")]
    StreamParse(String),
    /// An error occurred while interpreting a `DEFINE_ABBREV` record.
    #[error("error while parsing abbrev record: {0}")]
    AbbrevParse(String),
    /// A record refers to an abbreviation ID that isn't defined in its scope.
    #[error("unknown abbreviation for ID: {0}")]
    BadAbbrev(u64),
    /// An error occurred during block scope entrance or exit.
    #[error("error while handling block scope: {0}")]
    BadScope(String),
    /// A record's values can't be written with the requested abbreviation.
    #[error("can't encode record: {0}")]
    Unencodable(String),
}
