//! A blocking byte queue between a producer thread and a consuming [`DataStreamer`].

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::Error;
use crate::DataStreamer;

/// The queue's initial capacity.
pub const BASE_SIZE: usize = 64 * 1024;

/// The queue grows by doubling up to this capacity, after which producers block.
pub const MAX_SIZE: usize = 256 * 1024;

#[derive(Debug)]
struct QueueState {
    bytes: VecDeque<u8>,
    capacity: usize,
    done: bool,
}

/// A thread-safe byte queue: producers [`put_bytes`](QueueStreamer::put_bytes),
/// and the consumer reads through [`DataStreamer`] on an `Arc<QueueStreamer>`.
///
/// Consumers block until enough bytes arrive or the producer calls
/// [`set_done`](QueueStreamer::set_done).
#[derive(Debug)]
pub struct QueueStreamer {
    state: Mutex<QueueState>,
    cond: Condvar,
}

impl Default for QueueStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStreamer {
    /// Create a new, empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                bytes: VecDeque::with_capacity(BASE_SIZE),
                capacity: BASE_SIZE,
                done: false,
            }),
            cond: Condvar::new(),
        }
    }

    // NOTE: Nothing in the queue can be left half-updated by a panic, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, QueueState>) -> MutexGuard<'a, QueueState> {
        self.cond
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `buf` to the queue, blocking while it's full.
    pub fn put_bytes(&self, buf: &[u8]) -> usize {
        let mut state = self.lock();
        let mut remaining = buf;

        while state.capacity - state.bytes.len() < remaining.len() {
            if state.capacity * 2 > MAX_SIZE {
                let space = state.capacity - state.bytes.len();
                state.bytes.extend(&remaining[..space]);
                remaining = &remaining[space..];
                self.cond.notify_all();
                state = self.wait(state);
            } else {
                state.capacity *= 2;
                log::debug!("queue streamer: growing to {} bytes", state.capacity);
            }
        }

        state.bytes.extend(remaining);
        self.cond.notify_all();
        buf.len()
    }

    /// Mark the end of the stream, waking any waiting consumer.
    pub fn set_done(&self) {
        let mut state = self.lock();
        state.done = true;
        self.cond.notify_all();
    }

    /// Take bytes off the queue into `buf`, blocking until it's full or the
    /// stream is done. Returns the number of bytes taken.
    pub fn get_bytes(&self, buf: &mut [u8]) -> usize {
        let mut state = self.lock();
        let mut copied = 0;

        while !state.done && state.bytes.len() < buf.len() - copied {
            copied += take(&mut state.bytes, &mut buf[copied..]);
            self.cond.notify_all();
            state = self.wait(state);
        }

        copied += take(&mut state.bytes, &mut buf[copied..]);
        self.cond.notify_all();
        copied
    }
}

/// Move as many bytes as fit from the front of `bytes` into `buf`.
fn take(bytes: &mut VecDeque<u8>, buf: &mut [u8]) -> usize {
    let len = bytes.len().min(buf.len());
    for (dst, src) in buf.iter_mut().zip(bytes.drain(..len)) {
        *dst = src;
    }
    len
}

impl DataStreamer for Arc<QueueStreamer> {
    fn get_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        Ok(QueueStreamer::get_bytes(self, buf))
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_put_then_get() {
        let queue = QueueStreamer::new();
        assert_eq!(queue.put_bytes(b"hello"), 5);
        queue.set_done();

        let mut buf = [0; 8];
        assert_eq!(queue.get_bytes(&mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(queue.get_bytes(&mut buf), 0);
    }

    #[test]
    fn test_grows_without_blocking() {
        let queue = QueueStreamer::new();
        let data = vec![7; MAX_SIZE];
        assert_eq!(queue.put_bytes(&data), MAX_SIZE);
        assert_eq!(queue.lock().capacity, MAX_SIZE);

        let mut buf = vec![0; MAX_SIZE];
        assert_eq!(queue.get_bytes(&mut buf), MAX_SIZE);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_producer_blocks_when_full() {
        let queue = Arc::new(QueueStreamer::new());
        let data: Vec<u8> = (0..3 * MAX_SIZE).map(|i| (i % 256) as u8).collect();

        let producer = {
            let queue = Arc::clone(&queue);
            let data = data.clone();
            thread::spawn(move || {
                queue.put_bytes(&data);
                queue.set_done();
            })
        };

        let mut streamer = Arc::clone(&queue);
        let mut received = vec![];
        let mut buf = vec![0; 10_000];
        loop {
            let n = DataStreamer::get_bytes(&mut streamer, &mut buf).unwrap();
            received.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                break;
            }
        }

        producer.join().unwrap();
        assert_eq!(received, data);
    }
}
