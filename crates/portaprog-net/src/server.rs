//! Listening socket and per-connection loop

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use portaprog_core::dispatch::Dispatcher;
use portaprog_core::store::FileStore;
use portaprog_core::stream::ByteSink;

use crate::connection::TcpConnection;
use crate::error::{NetError, Result};

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// How long one pass waits for more bytes before it ends
    pub read_wait: Duration,
    /// Silence after which a client is disconnected, zero waits forever
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 23,
            read_wait: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters for one client session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Passes run over the connection
    pub passes: usize,
    /// Commands executed
    pub commands: usize,
    /// Errors reported to the client
    pub errors: usize,
    /// Bytes received
    pub bytes_read: usize,
}

/// TCP command server
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    /// Bind the listening socket
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.bind, config.port);
        let listener = TcpListener::bind(&addr).map_err(|source| NetError::Bind {
            addr: addr.clone(),
            source,
        })?;
        log::info!("listening on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// Address actually bound, useful with port 0
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Listener settings
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve clients one after another until `cancel` is set
    ///
    /// Between clients the dispatcher is polled every read wait so the
    /// programmer backend keeps getting time.
    pub fn serve<F: FileStore>(
        &self,
        dispatcher: &mut Dispatcher<'_, F>,
        cancel: &AtomicBool,
    ) -> Result<()> {
        self.listener.set_nonblocking(true)?;
        while !cancel.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = self.session(stream, dispatcher, cancel) {
                        log::warn!("client {}: {}", peer, e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    dispatcher.poll();
                    thread::sleep(self.config.read_wait);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        log::info!("server stopped");
        Ok(())
    }

    /// Wait for one client and serve it until it leaves
    pub fn serve_one<F: FileStore>(
        &self,
        dispatcher: &mut Dispatcher<'_, F>,
    ) -> Result<SessionStats> {
        self.listener.set_nonblocking(false)?;
        let (stream, _) = self.listener.accept()?;
        self.session(stream, dispatcher, &AtomicBool::new(false))
    }

    fn session<F: FileStore>(
        &self,
        stream: TcpStream,
        dispatcher: &mut Dispatcher<'_, F>,
        cancel: &AtomicBool,
    ) -> Result<SessionStats> {
        let mut conn = TcpConnection::new(stream, self.config.read_wait)?;
        let peer = conn.peer();
        log::info!("client connected: {}", peer);

        let mut stats = SessionStats::default();
        let mut last_activity = Instant::now();
        while !conn.is_finished() && !cancel.load(Ordering::Relaxed) {
            let outcome = dispatcher.process(&mut conn, false);
            stats.passes += 1;
            stats.commands += outcome.executed.len();
            stats.errors += outcome.errors;
            stats.bytes_read += outcome.bytes_read;

            if outcome.bytes_read > 0 {
                last_activity = Instant::now();
                log::debug!(
                    "{}: pass ran {} command(s), {} error(s)",
                    peer,
                    outcome.executed.len(),
                    outcome.errors
                );
            } else if !self.config.idle_timeout.is_zero()
                && last_activity.elapsed() >= self.config.idle_timeout
            {
                log::info!("client {} idle, disconnecting", peer);
                break;
            }
            dispatcher.poll();
        }
        conn.flush();
        log::info!(
            "client disconnected: {} ({} bytes, {} commands)",
            peer,
            stats.bytes_read,
            stats.commands
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portaprog_core::programmer::{Programmer, ProgrammerKind, SimulatedTarget};
    use portaprog_core::registry::Registry;
    use portaprog_core::store::MemFs;
    use portaprog_fs::DirFs;
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::sync::Arc;
    use tempfile::tempdir;

    static REGISTRY: Registry = Registry::standard();

    fn test_server(idle: Duration) -> Server {
        Server::bind(ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            read_wait: Duration::from_millis(50),
            idle_timeout: idle,
        })
        .unwrap()
    }

    /// Send `input`, half-close, collect everything the server answers
    fn client(addr: SocketAddr, input: Vec<u8>) -> thread::JoinHandle<String> {
        thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&input).unwrap();
            stream.shutdown(Shutdown::Write).unwrap();
            let mut text = String::new();
            stream.read_to_string(&mut text).unwrap();
            text
        })
    }

    #[test]
    fn test_session_runs_commands() {
        let server = test_server(Duration::from_secs(5));
        let addr = server.local_addr().unwrap();
        let mut d = Dispatcher::new(&REGISTRY, MemFs::new());
        d.store_mut().insert("a.txt", b"x").unwrap();

        let handle = client(addr, b"INFO 1 2\nDEL a.txt\nBOGUS\n".to_vec());
        let stats = server.serve_one(&mut d).unwrap();
        let text = handle.join().unwrap();

        assert_eq!(
            text,
            "INFO: p1=[1], p2=[2]\r\nFile a.txt deleted\nError, unrecognized command: [BOGUS]\n\n"
        );
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.bytes_read, 25);
    }

    #[test]
    fn test_session_polls_programmer() {
        let server = test_server(Duration::from_secs(5));
        let addr = server.local_addr().unwrap();
        let target = SimulatedTarget::new([0x1E, 0x95, 0x0F]);
        let mut d = Dispatcher::new(&REGISTRY, MemFs::new()).with_programmer(Programmer::new(
            ProgrammerKind::Spi,
            Box::new(target.clone()),
        ));

        let handle = client(addr, b"CHIP\n".to_vec());
        let stats = server.serve_one(&mut d).unwrap();
        let text = handle.join().unwrap();

        assert_eq!(text, "SPI target: signature 1E 95 0F (ATmega328P)\n");
        assert!(stats.passes >= 1);
        assert_eq!(target.polls() as usize, stats.passes);
    }

    #[test]
    fn test_upload_over_tcp_to_directory() {
        let tmp = tempdir().unwrap();
        let server = test_server(Duration::from_secs(5));
        let addr = server.local_addr().unwrap();
        let mut d = Dispatcher::new(&REGISTRY, DirFs::open(tmp.path()).unwrap());

        let mut input = b"upload blink.hex\n".to_vec();
        input.extend_from_slice(b":100000000C9434000C943E000C943E000C943E0082\r\n:00000001FF\r\n");
        let handle = client(addr, input);
        server.serve_one(&mut d).unwrap();
        assert!(handle.join().unwrap().is_empty());

        assert_eq!(
            std::fs::read(tmp.path().join("blink.hex")).unwrap(),
            b":100000000C9434000C943E000C943E000C943E0082\n:00000001FF\n"
        );
    }

    #[test]
    fn test_idle_client_is_disconnected() {
        let server = test_server(Duration::from_millis(200));
        let addr = server.local_addr().unwrap();
        let mut d = Dispatcher::new(&REGISTRY, MemFs::new());

        let handle = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let mut buf = Vec::new();
            // returns once the server gives up on us
            stream.read_to_end(&mut buf).unwrap();
            buf
        });
        let stats = server.serve_one(&mut d).unwrap();
        assert!(handle.join().unwrap().is_empty());
        assert!(stats.passes >= 2);
        assert_eq!(stats.bytes_read, 0);
    }

    #[test]
    fn test_serve_stops_on_cancel() {
        let server = test_server(Duration::from_secs(5));
        let addr = server.local_addr().unwrap();
        let mut d = Dispatcher::new(&REGISTRY, MemFs::new());
        let cancel = Arc::new(AtomicBool::new(false));

        let stopper = {
            let cancel = Arc::clone(&cancel);
            thread::spawn(move || {
                let text = client(addr, b"HELP\n".to_vec()).join().unwrap();
                cancel.store(true, Ordering::Relaxed);
                text
            })
        };
        server.serve(&mut d, &cancel).unwrap();
        let text = stopper.join().unwrap();
        assert!(text.starts_with("HELP"));
        assert!(text.contains("Linux usage:"));
    }
}
