//! Byte stream abstractions
//!
//! The dispatcher, the command effects and the file store all talk to the
//! outside world through these traits. A transport (TCP connection, local
//! console, open file) only has to say how many bytes are ready, hand them
//! out one at a time and accept output bytes.
//!
//! None of these calls block waiting for data: `available() == 0` means
//! "nothing right now", which is how a pass over a connection ends.

use core::fmt;

/// Source of bytes that are consumed one at a time
pub trait ByteSource {
    /// Number of bytes that can be read without waiting
    fn available(&mut self) -> usize;

    /// Read the next byte, `None` when nothing is available
    fn read_byte(&mut self) -> Option<u8>;

    /// Look at the next byte without consuming it
    fn peek_byte(&mut self) -> Option<u8>;
}

/// Sink for output bytes
pub trait ByteSink {
    /// Write bytes, returning how many were accepted
    fn write(&mut self, data: &[u8]) -> usize;

    /// Push out anything the sink is holding back
    fn flush(&mut self) {}

    /// Formatted output, returning the number of bytes accepted
    fn print_fmt(&mut self, args: fmt::Arguments<'_>) -> usize {
        let mut counter = Counter {
            sink: self,
            written: 0,
        };
        // Counter never fails; a short write shows up in the count
        let _ = fmt::Write::write_fmt(&mut counter, args);
        counter.written
    }
}

struct Counter<'a, S: ByteSink + ?Sized> {
    sink: &'a mut S,
    written: usize,
}

impl<S: ByteSink + ?Sized> fmt::Write for Counter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.written += self.sink.write(s.as_bytes());
        Ok(())
    }
}

/// Bidirectional byte stream, the shape of every connection
pub trait Stream: ByteSource + ByteSink {}

impl<T: ByteSource + ByteSink + ?Sized> Stream for T {}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn available(&mut self) -> usize {
        (**self).available()
    }

    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        (**self).peek_byte()
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// Formatted write to a [`ByteSink`]
///
/// ```ignore
/// reply!(client, "File {} deleted\n", name);
/// ```
#[macro_export]
macro_rules! reply {
    ($sink:expr, $($arg:tt)*) => {
        $crate::stream::ByteSink::print_fmt(&mut *$sink, format_args!($($arg)*))
    };
}

/// Adapter turning an `embedded-io` device into a [`Stream`]
///
/// `available()` is answered from `ReadReady` and a single byte of
/// look-ahead, so at most one byte is reported even when the device holds
/// more. That is enough for the byte-at-a-time consumers in this crate.
pub struct IoStream<T> {
    inner: T,
    lookahead: Option<u8>,
}

impl<T> IoStream<T> {
    /// Wrap an embedded-io device
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            lookahead: None,
        }
    }

    /// Give back the wrapped device, dropping any look-ahead byte
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Access the wrapped device
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> IoStream<T>
where
    T: embedded_io::Read + embedded_io::ReadReady,
{
    fn fill(&mut self) {
        if self.lookahead.is_some() {
            return;
        }
        if !self.inner.read_ready().unwrap_or(false) {
            return;
        }
        let mut byte = [0u8; 1];
        if let Ok(1) = self.inner.read(&mut byte) {
            self.lookahead = Some(byte[0]);
        }
    }
}

impl<T> ByteSource for IoStream<T>
where
    T: embedded_io::Read + embedded_io::ReadReady,
{
    fn available(&mut self) -> usize {
        self.fill();
        usize::from(self.lookahead.is_some())
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.fill();
        self.lookahead.take()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.fill();
        self.lookahead
    }
}

impl<T> ByteSink for IoStream<T>
where
    T: embedded_io::Write,
{
    fn write(&mut self, data: &[u8]) -> usize {
        match self.inner.write_all(data) {
            Ok(()) => data.len(),
            Err(e) => {
                log::debug!("stream write failed: {:?}", embedded_io::Error::kind(&e));
                0
            }
        }
    }

    fn flush(&mut self) {
        let _ = self.inner.flush();
    }
}
