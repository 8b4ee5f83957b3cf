//! Client connection as a byte stream

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use portaprog_core::stream::{ByteSink, ByteSource};

use crate::error::{NetError, Result};

const READ_CHUNK: usize = 512;
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepted TCP client
///
/// `available()` waits up to the read wait for new bytes when nothing is
/// buffered, so a pass over the connection ends after that much silence
/// instead of spinning.
pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    pending: VecDeque<u8>,
    closed: bool,
}

impl TcpConnection {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream, read_wait: Duration) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let setup = |source| NetError::Setup { peer, source };
        // accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false).map_err(setup)?;
        stream.set_nodelay(true).map_err(setup)?;
        stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(setup)?;
        // a zero timeout is rejected by the OS
        let read_wait = read_wait.max(Duration::from_millis(1));
        stream.set_read_timeout(Some(read_wait)).map_err(setup)?;
        Ok(Self {
            stream,
            peer,
            pending: VecDeque::with_capacity(READ_CHUNK),
            closed: false,
        })
    }

    /// Remote address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// True once the peer hung up or the socket failed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True when the peer is gone and every byte it sent was consumed
    pub fn is_finished(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    fn fill(&mut self) {
        if !self.pending.is_empty() || self.closed {
            return;
        }
        let mut buf = [0u8; READ_CHUNK];
        match self.stream.read(&mut buf) {
            Ok(0) => {
                log::debug!("{}: peer closed", self.peer);
                self.closed = true;
            }
            Ok(n) => {
                log::trace!("{}: received {} bytes", self.peer, n);
                self.pending.extend(&buf[..n]);
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                log::warn!("{}: read failed: {}", self.peer, e);
                self.closed = true;
            }
        }
    }
}

impl ByteSource for TcpConnection {
    fn available(&mut self) -> usize {
        self.fill();
        self.pending.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.fill();
        self.pending.pop_front()
    }

    fn peek_byte(&mut self) -> Option<u8> {
        self.fill();
        self.pending.front().copied()
    }
}

impl ByteSink for TcpConnection {
    fn write(&mut self, data: &[u8]) -> usize {
        match self.stream.write_all(data) {
            Ok(()) => data.len(),
            Err(e) => {
                log::warn!("{}: write failed: {}", self.peer, e);
                0
            }
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.stream.flush() {
            log::debug!("{}: flush failed: {}", self.peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Shutdown, TcpListener};
    use std::time::Instant;

    fn pair(read_wait: Duration) -> (TcpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();
        (TcpConnection::new(stream, read_wait).unwrap(), client)
    }

    #[test]
    fn test_available_is_bounded() {
        let (mut conn, _client) = pair(Duration::from_millis(50));
        let start = Instant::now();
        assert_eq!(conn.available(), 0);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_reads_and_detects_close() {
        let (mut conn, mut client) = pair(Duration::from_secs(2));
        client.write_all(b"DIR\n").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let mut got = Vec::new();
        while let Some(b) = conn.read_byte() {
            got.push(b);
        }
        assert_eq!(got, b"DIR\n");
        assert_eq!(conn.available(), 0);
        assert!(conn.is_finished());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (mut conn, mut client) = pair(Duration::from_secs(2));
        client.write_all(b"x").unwrap();
        assert_eq!(conn.peek_byte(), Some(b'x'));
        assert_eq!(conn.read_byte(), Some(b'x'));
    }

    #[test]
    fn test_write_reaches_client() {
        let (mut conn, mut client) = pair(Duration::from_millis(50));
        assert_eq!(conn.write(b"hello\n"), 6);
        conn.flush();
        drop(conn);
        let mut text = String::new();
        client.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\n");
    }
}
