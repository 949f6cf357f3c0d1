//! `pnacl-bitcursor` reads and writes unaligned, little-endian bit fields.
//!
//! [`BitCursor`] is the reading half, used by the bitstream parser. [`BitWriter`]
//! is the writing half, used when re-emitting compressed bitcode. Both deal in
//! the 32-bit word alignment that PNaCl bitstreams use for block boundaries.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

pub mod error;
pub mod writer;

use std::io;

use num::NumCast;

pub use crate::error::Error;
pub use crate::writer::BitWriter;

/// The largest chunk width accepted for VBR encodings.
pub const MAX_VBR_WIDTH: usize = 32;

/// Returns the number of bits needed to hold `width`-wide VBR `value`.
pub fn vbr_bit_size(value: u64, width: usize) -> usize {
    let chunk = width - 1;
    let mut remaining = value >> chunk;
    let mut bits = width;
    while remaining != 0 {
        bits += width;
        remaining >>= chunk;
    }
    bits
}

/// A cursor over a byte buffer that reads at bit granularity.
///
/// The buffer is anything implementing `AsRef<[u8]>`, so both borrowed slices
/// and owned vectors can be read without copying.
#[derive(Debug)]
pub struct BitCursor<T: AsRef<[u8]>> {
    /// How many bytes of `inner` are visible to the cursor.
    byte_len: usize,

    inner: T,

    /// Index of the next byte of `inner` to load into `current_block`.
    byte_pos: usize,

    /// Up to eight bytes of `inner`, least significant byte first.
    current_block: u64,

    /// How many bits of `current_block` haven't been consumed yet.
    bit_index: usize,
}

impl<T: AsRef<[u8]>> BitCursor<T> {
    const BLOCK_SIZE: usize = std::mem::size_of::<u64>();
    const BLOCK_SIZE_BITS: usize = u64::BITS as usize;

    /// Create a new `BitCursor` over all of `inner`.
    pub fn new(inner: T) -> Self {
        Self {
            byte_len: inner.as_ref().len(),
            inner: inner,
            byte_pos: 0,
            current_block: 0,
            bit_index: 0,
        }
    }

    /// Create a new `BitCursor` over the first `byte_len` bytes of `inner`.
    pub fn new_with_len(inner: T, byte_len: usize) -> Result<Self, Error> {
        if byte_len > inner.as_ref().len() {
            return Err(Error::InvalidLength);
        }

        Ok(Self {
            byte_len: byte_len,
            inner: inner,
            byte_pos: 0,
            current_block: 0,
            bit_index: 0,
        })
    }

    /// Return the visible length of the buffer, in bytes.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Return the visible length of the buffer, in bits.
    pub fn bit_len(&self) -> usize {
        self.byte_len() * 8
    }

    /// Return the current position, in bits.
    pub fn tell_bit(&self) -> usize {
        (self.byte_pos * 8) - self.bit_index
    }

    /// Return the current position, in whole bytes.
    pub fn tell_byte(&self) -> usize {
        self.tell_bit() / 8
    }

    /// Return whether no further bits can be read.
    pub fn exhausted(&self) -> bool {
        self.bit_index == 0 && self.byte_pos >= self.byte_len()
    }

    /// Seek to an absolute bit position.
    ///
    /// For byte-granular or relative seeks, use the [`Seek`](std::io::Seek) implementation.
    pub fn seek_bit(&mut self, pos: usize) -> Result<(), Error> {
        log::debug!("seek_bit: pos={}", pos);

        // Start from the enclosing 64-bit block, then discard the bits before `pos`.
        let byte_pos = (pos / 8) & !(Self::BLOCK_SIZE - 1);
        if byte_pos > self.byte_len() {
            return Err(Error::Eof);
        }

        self.byte_pos = byte_pos;
        self.reset_block();

        let skip = pos % Self::BLOCK_SIZE_BITS;
        if skip > 0 {
            self.read(skip)?;
        }

        Ok(())
    }

    fn reset_block(&mut self) {
        self.current_block = 0;
        self.bit_index = 0;
    }

    /// Load the next (up to) eight bytes into `current_block`.
    fn refill(&mut self) -> Result<(), Error> {
        if self.byte_pos >= self.byte_len() {
            return Err(Error::Eof);
        }

        let end = std::cmp::min(self.byte_pos + Self::BLOCK_SIZE, self.byte_len());
        let bytes = &self.inner.as_ref()[self.byte_pos..end];

        self.current_block = bytes
            .iter()
            .enumerate()
            .fold(0u64, |acc, (idx, byte)| acc | ((*byte as u64) << (idx * 8)));
        self.bit_index = bytes.len() * 8;
        self.byte_pos = end;

        log::debug!(
            "refill: current_block={:#x}, bit_index={}",
            self.current_block,
            self.bit_index
        );

        Ok(())
    }

    /// Take `nbits` from the low end of `current_block`, which must hold at least that many.
    fn take(&mut self, nbits: usize) -> u64 {
        let value = self.current_block & (!0 >> (Self::BLOCK_SIZE_BITS - nbits));

        // A full-width shift would overflow; the block is simply spent.
        if nbits == Self::BLOCK_SIZE_BITS {
            self.current_block = 0;
        } else {
            self.current_block >>= nbits;
        }
        self.bit_index -= nbits;

        value
    }

    /// Read `nbits` bits at the current position.
    ///
    /// `nbits` must be in `1..64`.
    pub fn read(&mut self, nbits: usize) -> Result<u64, Error> {
        if nbits == 0 || nbits >= Self::BLOCK_SIZE_BITS {
            return Err(Error::InvalidWidth(nbits));
        }

        if self.bit_index >= nbits {
            return Ok(self.take(nbits));
        }

        // Drain what's left of this block, then finish from the next one.
        let low_bits = self.bit_index;
        let low = if low_bits > 0 { self.take(low_bits) } else { 0 };

        self.refill()?;

        let high_bits = nbits - low_bits;
        if high_bits > self.bit_index {
            return Err(Error::Short);
        }

        let high = self.take(high_bits);
        Ok(low | (high << low_bits))
    }

    /// Read `nbits` bits at the current position into the given scalar type.
    pub fn read_as<Int: NumCast>(&mut self, nbits: usize) -> Result<Int, Error> {
        num::cast(self.read(nbits)?).ok_or(Error::BadCast)
    }

    /// Read exactly as many bits as `Int` holds.
    pub fn read_exact<Int: NumCast>(&mut self) -> Result<Int, Error> {
        self.read_as::<Int>(std::mem::size_of::<Int>() * 8)
    }

    /// Read a VBR-encoded integer with chunks of `width` bits.
    pub fn read_vbr(&mut self, width: usize) -> Result<u64, Error> {
        if !(2..=MAX_VBR_WIDTH).contains(&width) {
            return Err(Error::InvalidVbrWidth(width));
        }

        let continuation = 1u64 << (width - 1);
        let mut result = 0u64;
        let mut shift = 0usize;
        loop {
            let chunk = self.read(width)?;
            let payload = chunk & !continuation;

            if shift >= Self::BLOCK_SIZE_BITS
                || (shift > 0 && payload.leading_zeros() < shift as u32)
            {
                return Err(Error::VbrOverflow);
            }
            result |= payload << shift;

            if chunk & continuation == 0 {
                break;
            }
            shift += width - 1;
        }

        Ok(result)
    }

    /// Skip forward to the next 32-bit boundary, discarding the skipped bits.
    pub fn align32(&mut self) {
        let misalignment = self.tell_bit() % 32;
        if misalignment == 0 {
            return;
        }

        // Every refill starts on a 64-bit boundary, so the pending bits are either
        // the rest of the current word plus one whole word, or the rest of one word.
        let discard = 32 - misalignment;
        if discard <= self.bit_index {
            self.take(discard);
        } else {
            self.reset_block();
        }
    }
}

/// A byte-granular `Seek` implementation for `BitCursor`.
///
/// Seeking past the end is always an error. For bit-granular seeks, use
/// [`seek_bit`](BitCursor::seek_bit).
impl<T: AsRef<[u8]>> io::Seek for BitCursor<T> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(pos) => Some(pos as i128),
            io::SeekFrom::End(pos) if pos < 0 => Some(self.byte_len() as i128 + pos as i128),
            io::SeekFrom::End(_) => None,
            io::SeekFrom::Current(pos) => Some(self.tell_byte() as i128 + pos as i128),
        };

        let target = match target {
            Some(target) if target >= 0 && target <= self.byte_len() as i128 => target as usize,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "seek target out of bounds",
                ))
            }
        };

        self.byte_pos = target;
        self.reset_block();

        Ok(target as u64)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.tell_byte() as u64)
    }
}
