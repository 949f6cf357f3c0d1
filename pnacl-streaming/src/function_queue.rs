//! Splitting function bodies between translation threads.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Error;

/// Hands out function indices to worker threads, either statically or in
/// dynamically claimed chunks.
#[derive(Debug)]
pub struct ThreadedFunctionQueue {
    num_threads: usize,
    /// Approximate: later passes may add declarations.
    num_functions: usize,
    /// The first function index no thread has claimed yet.
    current: AtomicUsize,
}

impl ThreadedFunctionQueue {
    /// Create a queue for `num_functions` functions split between `num_threads` threads.
    pub fn new(num_functions: usize, num_threads: usize) -> Result<Self, Error> {
        if num_threads == 0 {
            return Err(Error::NoThreads);
        }

        Ok(Self {
            num_threads: num_threads,
            num_functions: num_functions,
            current: AtomicUsize::new(0),
        })
    }

    /// Returns whether function `index` belongs to thread `thread` under a fixed
    /// round-robin split.
    pub fn grab_static(&self, index: usize, thread: usize) -> bool {
        debug_assert!(thread < self.num_threads);
        index % self.num_threads == thread
    }

    /// Try to claim the `chunk` functions starting at `index` for the calling thread.
    ///
    /// On success, returns `Ok` with the index after the claimed chunk. Otherwise
    /// `index` was already taken, and `Err` holds the next unclaimed index to try.
    pub fn grab_dynamic(&self, index: usize, chunk: usize) -> Result<usize, usize> {
        let current = self.current.load(Ordering::Acquire);
        if index < current {
            return Err(current);
        }

        let next = current + chunk;
        self.current
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| next)
    }

    /// Returns a chunk size for [`grab_dynamic`](Self::grab_dynamic): large while
    /// many functions remain, shrinking towards the end to balance the load.
    pub fn recommended_chunk_size(&self) -> usize {
        let remaining = self
            .num_functions
            .saturating_sub(self.current.load(Ordering::Acquire))
            .max(1);
        (remaining / (self.num_threads * 4)).clamp(1, 8)
    }
}
