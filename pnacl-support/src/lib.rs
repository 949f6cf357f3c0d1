//! `pnacl-support` provides shared constants and code enums to the other
//! PNaCl bitcode crates.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

pub mod bitcodes;
pub mod names;

pub use self::names::*;

/// The abbreviation ID width every bitstream (and every `BLOCKINFO` block) starts with.
pub const INITIAL_ABBREV_ID_WIDTH: u64 = 2;

/// All abbreviation IDs before this are defined by the bitstream format,
/// rather than the stream itself.
pub const FIRST_APPLICATION_ABBREV_ID: u64 = 4;

/// All block IDs before this are reserved by the bitstream format.
pub const FIRST_APPLICATION_BLOCK_ID: u64 = 8;

/// The largest abbreviation ID available without any application abbreviations.
pub const DEFAULT_MAX_ABBREV: u64 = 3;

/// The lookup alphabet for the Char6 operand encoding.
pub const CHAR6_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._";

/// The number of leading record values that get their own value distributions.
/// Values at or beyond this index are folded into the last bucket.
pub const VALUE_INDEX_CUTOFF: usize = 6;

/// Returns the Char6 encoding of `value`, if it has one.
pub fn char6_encode(value: u64) -> Option<u64> {
    CHAR6_ALPHABET
        .iter()
        .position(|c| *c as u64 == value)
        .map(|pos| pos as u64)
}

/// Returns the character encoded by the Char6 `code`, if `code` is in range.
pub fn char6_decode(code: u64) -> Option<u8> {
    CHAR6_ALPHABET.get(code as usize).copied()
}

/// Returns the number of bits needed to represent abbreviation IDs up to `max_id`.
///
/// The result is never smaller than [`INITIAL_ABBREV_ID_WIDTH`].
pub fn abbrev_id_width(max_id: u64) -> u64 {
    let bits = (u64::BITS - max_id.leading_zeros()) as u64;
    std::cmp::max(bits, INITIAL_ABBREV_ID_WIDTH)
}
