//! Fixed-capacity circular byte buffer
//!
//! The buffer is allocated once with a fixed size and never grows. Bytes are
//! read from the read cursor and written at `(cursor + len) % capacity`.
//!
//! Overflow and underflow are not fatal: a failed `push` or `pop` bumps the
//! error counter and the caller carries on. A successful `pop` resets the
//! counter, so a non-zero value means "the consumer has not caught up since
//! the last failure".

use alloc::boxed::Box;
use alloc::vec;

use crate::stream::{ByteSink, ByteSource};

/// Default capacity used by the local console buffers
pub const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Circular byte buffer with overflow/underflow accounting
pub struct RingBuffer {
    data: Box<[u8]>,
    /// Index of the next byte to read
    cursor: usize,
    /// Number of unread bytes
    len: usize,
    errors: u16,
}

impl RingBuffer {
    /// Allocate a buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            len: 0,
            errors: 0,
        }
    }

    /// Total number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of unread bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when there is nothing to read
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when a push would fail
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Room left for writing
    pub fn available_for_write(&self) -> usize {
        self.capacity() - self.len
    }

    /// Overflow/underflow events since the last successful read
    pub fn error_count(&self) -> u16 {
        self.errors
    }

    /// Append a byte; fails when the buffer is full
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            self.errors = self.errors.saturating_add(1);
            return false;
        }
        let mut pos = self.cursor + self.len;
        if pos >= self.capacity() {
            pos -= self.capacity();
        }
        self.data[pos] = byte;
        self.len += 1;
        true
    }

    /// Take the oldest byte; fails when the buffer is empty
    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            self.errors = self.errors.saturating_add(1);
            return None;
        }
        let byte = self.data[self.cursor];
        self.cursor += 1;
        if self.cursor == self.capacity() {
            self.cursor = 0;
        }
        self.len -= 1;
        self.errors = 0;
        Some(byte)
    }

    /// Look at the oldest byte without consuming it
    ///
    /// Leaves the cursor and the error count alone, even when empty.
    pub fn peek(&self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        Some(self.data[self.cursor])
    }

    /// Copy everything `source` has to offer into the buffer
    ///
    /// Keeps reading until the source runs dry even when the buffer is full;
    /// each byte that does not fit is counted as an error and dropped.
    /// Returns the number of bytes stored.
    pub fn drain_from<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> usize {
        let mut count = 0;
        while let Some(byte) = source.read_byte() {
            if self.push(byte) {
                count += 1;
            }
        }
        count
    }

    /// Forget all content and reset the counters
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.len = 0;
        self.errors = 0;
        self.data.fill(0);
    }
}

impl ByteSource for RingBuffer {
    fn available(&mut self) -> usize {
        self.len
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.pop()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.peek()
    }
}

impl ByteSink for RingBuffer {
    fn write(&mut self, data: &[u8]) -> usize {
        data.iter().filter(|&&b| self.push(b)).count()
    }
}

/// Error reported through the `embedded-io` traits when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingFull;

impl embedded_io::Error for RingFull {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl embedded_io::ErrorType for RingBuffer {
    type Error = RingFull;
}

/// Reading an empty ring returns `Ok(0)`, which `embedded-io` callers take
/// as end of stream. The ring has no end, so check [`ReadReady`] first
/// instead of relying on `read_exact`.
///
/// [`ReadReady`]: embedded_io::ReadReady
impl embedded_io::Read for RingBuffer {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.len);
        for slot in buf.iter_mut().take(n) {
            if let Some(byte) = self.pop() {
                *slot = byte;
            }
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for RingBuffer {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_empty())
    }
}

impl embedded_io::Write for RingBuffer {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = ByteSink::write(self, buf);
        if n == 0 {
            Err(RingFull)
        } else {
            Ok(n)
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::WriteReady for RingBuffer {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn test_round_trip() {
        let mut ring = RingBuffer::new(16);
        for b in b"hello" {
            assert!(ring.push(*b));
        }
        assert_eq!(ring.len(), 5);
        let out: Vec<u8> = core::iter::from_fn(|| ring.pop()).collect();
        assert_eq!(out, b"hello");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overflow_leaves_contents() {
        let mut ring = RingBuffer::new(3);
        assert!(ring.push(1));
        assert!(ring.push(2));
        assert!(ring.push(3));
        assert!(!ring.push(4));
        assert!(!ring.push(5));
        assert_eq!(ring.error_count(), 2);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.available_for_write(), 0);
        assert_eq!(ring.pop(), Some(1));
        assert_eq!(ring.error_count(), 0);
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
    }

    #[test]
    fn test_underflow_counts() {
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.error_count(), 1);
        ring.push(9);
        assert_eq!(ring.peek(), Some(9));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.pop(), Some(9));
        assert_eq!(ring.error_count(), 0);
    }

    #[test]
    fn test_peek_leaves_error_count() {
        let ring = RingBuffer::new(4);
        assert_eq!(ring.peek(), None);
        assert_eq!(ring.peek(), None);
        assert_eq!(ring.error_count(), 0);
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn test_wraparound() {
        let mut ring = RingBuffer::new(4);
        for round in 0..10u8 {
            assert!(ring.push(round));
            assert!(ring.push(round + 100));
            assert_eq!(ring.pop(), Some(round));
            assert_eq!(ring.pop(), Some(round + 100));
        }
        // interleaved writes across the boundary keep FIFO order
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.pop(), Some(1));
        ring.push(4);
        ring.push(5);
        let out: Vec<u8> = core::iter::from_fn(|| ring.pop()).collect();
        assert_eq!(out, [2, 3, 4, 5]);
    }

    #[test]
    fn test_len_never_exceeds_capacity() {
        let mut ring = RingBuffer::new(5);
        let mut seed = 0x1234_5678u32;
        for _ in 0..1000 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            if seed & 0x100 != 0 {
                ring.push((seed >> 16) as u8);
            } else {
                ring.pop();
            }
            assert!(ring.len() <= ring.capacity());
            assert_eq!(ring.len() + ring.available_for_write(), 5);
        }
    }

    #[test]
    fn test_drain_from_counts_stored_bytes() {
        let mut source = RingBuffer::new(8);
        ByteSink::write(&mut source, b"abcdef");
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.drain_from(&mut source), 4);
        assert_eq!(ring.error_count(), 2);
        assert!(source.is_empty());
        assert_eq!(ring.pop(), Some(b'a'));
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(4);
        ring.push(1);
        ring.push(2);
        ring.pop();
        ring.pop();
        ring.pop();
        ring.clear();
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.error_count(), 0);
        assert_eq!(ring.available_for_write(), 4);
        ring.push(7);
        assert_eq!(ring.pop(), Some(7));
    }

    #[test]
    fn test_zero_capacity() {
        let mut ring = RingBuffer::new(0);
        assert!(!ring.push(1));
        assert_eq!(ring.pop(), None);
        assert_eq!(ring.available_for_write(), 0);
        assert_eq!(ring.error_count(), 2);
    }

    #[test]
    fn test_embedded_io_write_full() {
        use embedded_io::Write;
        let mut ring = RingBuffer::new(2);
        assert_eq!(Write::write(&mut ring, b"abc"), Ok(2));
        assert_eq!(Write::write(&mut ring, b"d"), Err(RingFull));
    }

    #[test]
    fn test_embedded_io_read_ready_guards_empty_reads() {
        use embedded_io::{Read, ReadReady};
        let mut ring = RingBuffer::new(4);
        assert_eq!(ring.read_ready(), Ok(false));
        ByteSink::write(&mut ring, b"ab");
        assert_eq!(ring.read_ready(), Ok(true));
        let mut buf = [0u8; 4];
        assert_eq!(Read::read(&mut ring, &mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ab");
        assert_eq!(ring.read_ready(), Ok(false));
        assert_eq!(ring.error_count(), 0);
    }
}
