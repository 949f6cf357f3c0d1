//! A per-thread window over a shared [`StreamingMemoryObject`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::StreamingMemoryObject;

/// The size of a cache line: the most bytes fetched from the shared object at once.
pub const CACHE_LINE_SIZE: u64 = 16 * 1024;

const CACHE_LINE_MASK: u64 = !(CACHE_LINE_SIZE - 1);

/// One thread's cache over a [`StreamingMemoryObject`] shared with other threads.
///
/// Reads are served from a single cache line of [`CACHE_LINE_SIZE`] bytes, which
/// is refetched under the shared lock when a read falls outside of it. Each
/// request must lie within one aligned line.
#[derive(Debug)]
pub struct ThreadedStreamingCache<S: StreamingMemoryObject> {
    streamer: Arc<Mutex<S>>,
    line: Vec<u8>,
    /// The address of `line[0]`, once a line has been fetched.
    base: Option<u64>,
    /// The number of valid bytes in `line`.
    valid: usize,
    /// Every address below this is known to be valid.
    min_object_size: u64,
}

impl<S: StreamingMemoryObject> ThreadedStreamingCache<S> {
    /// Create a new cache over `streamer`, initially empty.
    pub fn new(streamer: Arc<Mutex<S>>) -> Self {
        Self {
            streamer: streamer,
            line: vec![0; CACHE_LINE_SIZE as usize],
            base: None,
            valid: 0,
            min_object_size: 0,
        }
    }

    /// Returns the address the current cache line starts at, if one's been fetched.
    pub fn base(&self) -> Option<u64> {
        self.base
    }

    /// Returns the size the shared object is known to have at least.
    pub fn min_object_size(&self) -> u64 {
        self.min_object_size
    }

    // NOTE: A panic while holding the lock can't leave the shared object
    // partially updated in a way reads care about.
    fn lock(&self) -> MutexGuard<'_, S> {
        self.streamer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn raise_min_object_size(&mut self, size: u64) {
        self.min_object_size = self.min_object_size.max(size);
    }

    /// Load the aligned line containing `addr`.
    fn fetch_line(&mut self, addr: u64) -> Result<(), Error> {
        let base = addr & CACHE_LINE_MASK;
        let streamer = Arc::clone(&self.streamer);
        // NOTE: Locked through the clone so that `self.line` can be borrowed below.
        let mut shared = streamer.lock().unwrap_or_else(PoisonError::into_inner);

        let (expected, known_size) = if shared.is_valid_address(base + (CACHE_LINE_SIZE - 1))? {
            (CACHE_LINE_SIZE as usize, base.saturating_add(CACHE_LINE_SIZE))
        } else {
            let end = shared.get_extent()?;
            (end.saturating_sub(base) as usize, end)
        };

        let actual = shared.read_bytes(base, &mut self.line[..expected])?;
        drop(shared);

        if actual != expected {
            return Err(Error::ShortRead {
                addr: base,
                expected: expected,
                actual: actual,
            });
        }

        log::debug!("fetched cache line at {} ({} bytes)", base, expected);
        self.base = Some(base);
        self.valid = expected;
        self.raise_min_object_size(known_size);
        Ok(())
    }
}

impl<S: StreamingMemoryObject> StreamingMemoryObject for ThreadedStreamingCache<S> {
    /// # Panics
    ///
    /// Panics if the request spans two cache lines.
    fn read_bytes(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        // No object reaches the end of the address space.
        let end = match addr.checked_add(buf.len() as u64) {
            Some(end) => end,
            None => return Ok(0),
        };
        let in_line = matches!(self.base, Some(base) if addr >= base && end - base <= CACHE_LINE_SIZE);
        if !in_line {
            if addr & CACHE_LINE_MASK != (end - 1) & CACHE_LINE_MASK {
                panic!("read_bytes request spans cache lines: {}..{}", addr, end);
            }
            self.fetch_line(addr)?;
        }

        // Unwrap safety: a line was either already loaded or just fetched.
        #[allow(clippy::unwrap_used)]
        let base = self.base.unwrap();
        let line_end = base + self.valid as u64;
        if addr >= line_end {
            return Ok(0);
        }

        let len = (end.min(line_end) - addr) as usize;
        let offset = (addr - base) as usize;
        buf[..len].copy_from_slice(&self.line[offset..offset + len]);
        Ok(len)
    }

    fn is_valid_address(&mut self, addr: u64) -> Result<bool, Error> {
        if addr < self.min_object_size {
            return Ok(true);
        }

        let valid = self.lock().is_valid_address(addr)?;
        if valid {
            self.raise_min_object_size(addr.saturating_add(1));
        }
        Ok(valid)
    }

    fn is_object_end(&mut self, addr: u64) -> Result<bool, Error> {
        self.lock().is_object_end(addr)
    }

    fn drop_leading_bytes(&mut self, count: u64) -> Result<(), Error> {
        self.lock().drop_leading_bytes(count)
    }

    fn set_known_object_size(&mut self, size: u64) {
        self.raise_min_object_size(size);
        self.lock().set_known_object_size(size);
    }

    /// # Panics
    ///
    /// Always: the size of a stream isn't known until it's been read, so callers
    /// should use [`is_valid_address`](StreamingMemoryObject::is_valid_address)
    /// and [`is_object_end`](StreamingMemoryObject::is_object_end) instead.
    fn get_extent(&mut self) -> Result<u64, Error> {
        panic!("get_extent can't be called on a streaming cache");
    }
}
