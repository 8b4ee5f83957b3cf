//! Local console
//!
//! Runs commands that do not come from a network client: lines typed on the
//! host, `--exec` arguments and `.cmd` batch files. Input is queued in one
//! [`RingBuffer`] and every reply is captured in a second one so the caller
//! can show or replay it.

use alloc::vec::Vec;

use crate::dispatch::{Dispatcher, PassOutcome};
use crate::error::Result;
use crate::line::{read_line, strip_newline};
use crate::registry::MAX_NETWORK_TEXT;
use crate::ring::{RingBuffer, DEFAULT_CAPACITY};
use crate::store::{FileKind, FileStore, OpenMode};
use crate::stream::{ByteSink, ByteSource};

/// Command source and reply capture for local use
pub struct Console {
    input: RingBuffer,
    echo: RingBuffer,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_CAPACITY)
    }
}

impl Console {
    /// Console with the given buffer sizes
    pub fn new(input_capacity: usize, echo_capacity: usize) -> Self {
        Self {
            input: RingBuffer::new(input_capacity),
            echo: RingBuffer::new(echo_capacity),
        }
    }

    /// Queue raw input bytes, returning how many fit
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let stored = self.input.write(bytes);
        if stored < bytes.len() {
            log::warn!(
                "console input full, dropped {} bytes",
                bytes.len() - stored
            );
        }
        stored
    }

    /// Queue text with `\n` escapes decoded
    pub fn feed_escaped(&mut self, text: &[u8]) -> usize {
        let mut source = RingBuffer::new(text.len());
        source.write(text);
        let mut line = [0u8; MAX_NETWORK_TEXT + 1];
        let mut stored = 0;
        loop {
            let len = read_line(&mut source, &mut line, true);
            if len == 0 {
                break;
            }
            stored += self.feed(&line[..len]);
        }
        stored
    }

    /// Queue everything `source` has available
    pub fn feed_from<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> usize {
        self.input.drain_from(source)
    }

    /// Bytes waiting to be processed
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Bytes of reply text waiting in the echo buffer
    pub fn echo_len(&self) -> usize {
        self.echo.len()
    }

    /// Run one pass over the queued input
    pub fn run_pending<F: FileStore>(
        &mut self,
        dispatcher: &mut Dispatcher<'_, F>,
        aborted: bool,
    ) -> PassOutcome {
        dispatcher.process(self, aborted)
    }

    /// Queue one command line and run a pass over it
    pub fn run_line<F: FileStore>(
        &mut self,
        dispatcher: &mut Dispatcher<'_, F>,
        line: &str,
        aborted: bool,
    ) -> PassOutcome {
        self.feed(line.as_bytes());
        if !line.ends_with('\n') {
            self.feed(b"\n");
        }
        self.run_pending(dispatcher, aborted)
    }

    /// Run a command file from the store, one pass per non-empty line
    ///
    /// A line whose pass did not succeed aborts the pass of the next line,
    /// which then only runs non-abortable commands. Returns whether every
    /// line succeeded.
    pub fn run_file<F: FileStore>(
        &mut self,
        dispatcher: &mut Dispatcher<'_, F>,
        name: &str,
    ) -> Result<bool> {
        if FileKind::from_name(name) != FileKind::Cmd {
            log::warn!("{} does not look like a command file", name);
        }
        let mut file = dispatcher.store_mut().open(name, OpenMode::Read)?;
        log::info!("running command file {}", name);

        let mut buf = [0u8; MAX_NETWORK_TEXT + 1];
        let mut aborted = false;
        let mut all_ok = true;
        loop {
            let len = read_line(&mut file, &mut buf, false);
            if len == 0 {
                break;
            }
            let len = strip_newline(&buf, len);
            let line = &buf[..len];
            if line.iter().all(|c| c.is_ascii_whitespace()) {
                continue;
            }
            log::debug!("{}: {}", name, alloc::string::String::from_utf8_lossy(line));
            self.feed(line);
            self.feed(b"\n");
            let outcome = self.run_pending(dispatcher, aborted);
            aborted = !outcome.ok();
            all_ok &= !aborted;
        }

        dispatcher.store_mut().close(file);
        Ok(all_ok)
    }

    /// Take all captured reply bytes
    pub fn take_echo(&mut self) -> Vec<u8> {
        core::iter::from_fn(|| self.echo.pop()).collect()
    }

    /// Drop queued input and captured output
    pub fn clear(&mut self) {
        self.input.clear();
        self.echo.clear();
    }
}

impl ByteSource for Console {
    fn available(&mut self) -> usize {
        self.input.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.input.peek()
    }
}

impl ByteSink for Console {
    fn write(&mut self, data: &[u8]) -> usize {
        let stored = self.echo.write(data);
        if stored < data.len() {
            log::trace!("echo buffer full, dropped {} bytes", data.len() - stored);
        }
        stored
    }
}
