//! A bit-granular writer, the counterpart of [`BitCursor`](crate::BitCursor).

use crate::error::Error;
use crate::MAX_VBR_WIDTH;

/// Accumulates little-endian bit fields into a byte buffer, one 32-bit word at a time.
#[derive(Debug, Default)]
pub struct BitWriter {
    /// Completed 32-bit words.
    buffer: Vec<u8>,

    /// Bits not yet flushed into `buffer`, least significant first.
    pending: u128,

    /// The number of valid bits in `pending`. Always below 32 between calls.
    pending_bits: usize,
}

impl BitWriter {
    const MAX_WIDTH: usize = 63;

    /// Create a new, empty `BitWriter`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of bits emitted so far.
    pub fn tell_bit(&self) -> usize {
        self.buffer.len() * 8 + self.pending_bits
    }

    /// Return the number of whole 32-bit words flushed so far, as a byte offset.
    pub fn tell_byte(&self) -> usize {
        self.buffer.len()
    }

    fn flush_words(&mut self) {
        while self.pending_bits >= 32 {
            let word = (self.pending & 0xffff_ffff) as u32;
            self.buffer.extend_from_slice(&word.to_le_bytes());
            self.pending >>= 32;
            self.pending_bits -= 32;
        }
    }

    /// Emit the low `width` bits of `value`.
    ///
    /// `width` must be in `1..64`, and `value` must fit in it.
    pub fn emit(&mut self, value: u64, width: usize) -> Result<(), Error> {
        if width == 0 || width > Self::MAX_WIDTH {
            return Err(Error::InvalidWidth(width));
        }
        if value >> width != 0 {
            return Err(Error::ValueTooWide {
                value: value,
                width: width,
            });
        }

        self.pending |= (value as u128) << self.pending_bits;
        self.pending_bits += width;
        self.flush_words();

        Ok(())
    }

    /// Emit `value` as a VBR with chunks of `width` bits.
    pub fn emit_vbr(&mut self, mut value: u64, width: usize) -> Result<(), Error> {
        if !(2..=MAX_VBR_WIDTH).contains(&width) {
            return Err(Error::InvalidVbrWidth(width));
        }

        let continuation = 1u64 << (width - 1);
        while value >= continuation {
            self.emit((value & (continuation - 1)) | continuation, width)?;
            value >>= width - 1;
        }
        self.emit(value, width)
    }

    /// Pad with zero bits up to the next 32-bit boundary.
    pub fn align32(&mut self) {
        if self.pending_bits > 0 {
            self.pending_bits = 32;
            self.flush_words();
        }
    }

    /// Overwrite the (already flushed) 32-bit word at `byte_pos` with `word`.
    pub fn backpatch_word(&mut self, byte_pos: usize, word: u32) -> Result<(), Error> {
        if byte_pos % 4 != 0 || byte_pos + 4 > self.buffer.len() {
            return Err(Error::BadBackpatch(byte_pos));
        }

        self.buffer[byte_pos..byte_pos + 4].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    /// Append raw bytes. The writer must be 32-bit aligned, and `bytes` must
    /// be a whole number of words.
    pub fn emit_words(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.pending_bits != 0 || bytes.len() % 4 != 0 {
            return Err(Error::InvalidLength);
        }

        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Align to 32 bits and return the written bytes.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.align32();
        self.buffer
    }
}
