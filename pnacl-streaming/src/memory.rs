//! A byte object that is filled from a [`DataStreamer`] as it's read.

use std::io::{self, Read};

use crate::error::Error;
use crate::{DataStreamer, StreamingMemoryObject};

/// The number of bytes requested from the streamer at a time.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Adapts any [`Read`] into a [`DataStreamer`].
#[derive(Debug)]
pub struct ReadStreamer<R: Read>(pub R);

impl<R: Read> DataStreamer for ReadStreamer<R> {
    fn get_bytes(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.0.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

/// A growable buffer over a [`DataStreamer`], fetched in [`CHUNK_SIZE`] pieces
/// only as far as reads require.
///
/// Not thread-safe by itself: share it behind a lock, and read it through a
/// [`ThreadedStreamingCache`](crate::ThreadedStreamingCache) per thread.
#[derive(Debug)]
pub struct StreamingMemory<D: DataStreamer> {
    streamer: D,
    /// Everything fetched so far, including dropped leading bytes.
    bytes: Vec<u8>,
    /// The number of fetched bytes after the dropped ones.
    bytes_read: u64,
    bytes_skipped: u64,
    object_size: Option<u64>,
    eof: bool,
}

impl<D: DataStreamer> StreamingMemory<D> {
    /// Create a new `StreamingMemory` that fetches from `streamer`.
    pub fn new(streamer: D) -> Self {
        Self {
            streamer: streamer,
            bytes: vec![],
            bytes_read: 0,
            bytes_skipped: 0,
            object_size: None,
            eof: false,
        }
    }

    /// Returns the number of bytes fetched so far, not counting dropped ones.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Fetch until `pos` has arrived or the stream ends. Returns whether `pos` is
    /// within the object.
    fn fetch_to(&mut self, pos: u64) -> Result<bool, Error> {
        while pos >= self.bytes_read {
            if self.eof {
                return Ok(false);
            }

            let start = self.bytes.len();
            self.bytes.resize(start + CHUNK_SIZE, 0);
            let fetched = match self.streamer.get_bytes(&mut self.bytes[start..]) {
                Ok(fetched) => fetched,
                Err(e) => {
                    self.bytes.truncate(start);
                    return Err(e);
                }
            };
            self.bytes.truncate(start + fetched);
            self.bytes_read += fetched as u64;

            if fetched < CHUNK_SIZE {
                log::debug!("stream ended after {} bytes", self.bytes_read);
                self.eof = true;
                if self.object_size.is_none() {
                    self.object_size = Some(self.bytes_read);
                }
            }
        }

        Ok(self.object_size.map_or(true, |size| pos < size))
    }
}

impl<D: DataStreamer> StreamingMemoryObject for StreamingMemory<D> {
    fn read_bytes(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let end = match addr.checked_add(buf.len() as u64) {
            Some(end) => end,
            None => return Ok(0),
        };

        self.fetch_to(end - 1)?;
        if addr >= self.bytes_read {
            return Ok(0);
        }

        let end = end.min(self.bytes_read);
        let len = (end - addr) as usize;
        let start = (addr + self.bytes_skipped) as usize;
        buf[..len].copy_from_slice(&self.bytes[start..start + len]);
        Ok(len)
    }

    fn is_valid_address(&mut self, addr: u64) -> Result<bool, Error> {
        if matches!(self.object_size, Some(size) if addr < size) {
            return Ok(true);
        }
        self.fetch_to(addr)
    }

    fn is_object_end(&mut self, addr: u64) -> Result<bool, Error> {
        if let Some(size) = self.object_size {
            return Ok(addr == size);
        }
        self.fetch_to(addr)?;
        Ok(self.object_size == Some(addr) && addr != 0)
    }

    /// Dropping is cumulative: every call shifts addresses down further.
    fn drop_leading_bytes(&mut self, count: u64) -> Result<(), Error> {
        if self.bytes_read < count {
            return Err(Error::DropPastRead {
                requested: count,
                available: self.bytes_read,
            });
        }

        self.bytes_skipped += count;
        self.bytes_read -= count;
        self.object_size = self.object_size.map(|size| size.saturating_sub(count));
        Ok(())
    }

    fn set_known_object_size(&mut self, size: u64) {
        self.object_size = Some(size);
        self.bytes
            .reserve((size + self.bytes_skipped).saturating_sub(self.bytes.len() as u64) as usize);
        if size <= self.bytes_read {
            self.eof = true;
        }
    }

    fn get_extent(&mut self) -> Result<u64, Error> {
        if let Some(size) = self.object_size {
            return Ok(size);
        }

        let mut pos = self.bytes_read + CHUNK_SIZE as u64;
        while self.fetch_to(pos)? {
            pos += CHUNK_SIZE as u64;
        }
        Ok(self.object_size.unwrap_or(self.bytes_read))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn memory(len: usize) -> StreamingMemory<ReadStreamer<Cursor<Vec<u8>>>> {
        StreamingMemory::new(ReadStreamer(Cursor::new(data(len))))
    }

    #[test]
    fn test_fetches_lazily() {
        let mut memory = memory(40_000);
        assert_eq!(memory.bytes_read(), 0);

        let mut buf = [0; 10];
        assert_eq!(memory.read_bytes(0, &mut buf).unwrap(), 10);
        assert_eq!(&buf, &data(10)[..]);
        assert_eq!(memory.bytes_read(), CHUNK_SIZE as u64);
    }

    #[test]
    fn test_read_at_end() {
        let mut memory = memory(40_000);
        let mut buf = [0; 10];

        assert_eq!(memory.read_bytes(39_995, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], &data(40_000)[39_995..]);
        assert_eq!(memory.read_bytes(40_000, &mut buf).unwrap(), 0);
        assert_eq!(memory.read_bytes(0, &mut []).unwrap(), 0);
    }

    #[test]
    fn test_read_near_address_space_end() {
        let mut memory = memory(100);
        let mut buf = [0; 4];

        assert_eq!(memory.read_bytes(u64::MAX - 1, &mut buf).unwrap(), 0);
        assert_eq!(memory.read_bytes(u64::MAX - 4, &mut buf).unwrap(), 0);
        assert_eq!(memory.read_bytes(96, &mut buf).unwrap(), 4);
    }

    #[test]
    fn test_addresses() {
        let mut memory = memory(40_000);

        assert!(memory.is_valid_address(39_999).unwrap());
        assert!(!memory.is_object_end(39_999).unwrap());
        assert!(!memory.is_valid_address(40_000).unwrap());
        assert!(memory.is_object_end(40_000).unwrap());
        assert_eq!(memory.get_extent().unwrap(), 40_000);
    }

    #[test]
    fn test_object_end_without_size() {
        let mut memory = memory(100);
        assert!(memory.is_object_end(100).unwrap());

        let mut empty = self::memory(0);
        assert!(!empty.is_object_end(0).unwrap());
        assert_eq!(empty.get_extent().unwrap(), 0);
    }

    #[test]
    fn test_drop_leading_bytes() {
        let mut memory = memory(40_000);
        assert!(matches!(
            memory.drop_leading_bytes(4),
            Err(Error::DropPastRead {
                requested: 4,
                available: 0
            })
        ));

        let mut buf = [0; 4];
        memory.read_bytes(0, &mut buf).unwrap();
        memory.drop_leading_bytes(4).unwrap();

        memory.read_bytes(0, &mut buf).unwrap();
        assert_eq!(&buf, &data(8)[4..]);
        assert_eq!(memory.get_extent().unwrap(), 39_996);
    }

    #[test]
    fn test_known_size() {
        let mut memory = memory(40_000);
        memory.set_known_object_size(100);

        assert!(memory.is_valid_address(99).unwrap());
        assert!(!memory.is_valid_address(100).unwrap());
        assert!(memory.is_object_end(100).unwrap());
        assert_eq!(memory.get_extent().unwrap(), 100);
    }
}
