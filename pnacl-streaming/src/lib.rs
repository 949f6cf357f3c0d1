//! `pnacl-streaming` provides random access to a bitcode file that is still
//! arriving, safely shared between translation threads.
//!
//! A [`DataStreamer`] produces bytes in order (e.g. a [`QueueStreamer`] fed by a
//! download). A [`StreamingMemory`] buffers them on demand behind the
//! [`StreamingMemoryObject`] interface, and each worker thread reads it through
//! its own [`ThreadedStreamingCache`]. Work is split between threads with a
//! [`ThreadedFunctionQueue`].

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]
#![allow(clippy::redundant_field_names)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod function_queue;
pub mod memory;
pub mod queue;

pub use crate::cache::{ThreadedStreamingCache, CACHE_LINE_SIZE};
pub use crate::error::Error;
pub use crate::function_queue::ThreadedFunctionQueue;
pub use crate::memory::{ReadStreamer, StreamingMemory};
pub use crate::queue::QueueStreamer;

/// A source of bytes that can only be read front to back.
pub trait DataStreamer {
    /// Fill as much of `buf` as possible, blocking until data is available.
    ///
    /// Returns the number of bytes read; anything short of `buf.len()` means the
    /// stream has ended.
    fn get_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Error>;
}

/// A byte object whose full size may not be known until it has all arrived.
///
/// Addresses are relative to the first byte not dropped by
/// [`drop_leading_bytes`](StreamingMemoryObject::drop_leading_bytes).
pub trait StreamingMemoryObject {
    /// Copy bytes starting at `addr` into `buf`, returning the number copied.
    ///
    /// Fewer than `buf.len()` bytes are copied only at the end of the object.
    fn read_bytes(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, Error>;

    /// Returns whether `addr` is within the object, waiting for it to arrive if
    /// need be.
    fn is_valid_address(&mut self, addr: u64) -> Result<bool, Error>;

    /// Returns whether `addr` is exactly one past the object's last byte.
    fn is_object_end(&mut self, addr: u64) -> Result<bool, Error>;

    /// Drop `count` bytes from the front of the object, shifting every address down.
    fn drop_leading_bytes(&mut self, count: u64) -> Result<(), Error>;

    /// Record the object's size, if it's known ahead of time.
    fn set_known_object_size(&mut self, size: u64);

    /// Returns the object's size, waiting for all of it to arrive.
    fn get_extent(&mut self) -> Result<u64, Error>;
}
