//! Listening socket and accept loop

use super::connection::wait_readable;
use super::{Connection, Error, Result, DEFAULT_BACKLOG};
use crate::config::ServerConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// How long the acceptor waits for a client before re-checking the
/// running flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-connection protocol step run on the connection's own thread
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Drive `connection` until it is done with
    fn handle(&self, connection: Connection);
}

impl<F> ConnectionHandler for F
where
    F: Fn(Connection) + Send + Sync + 'static,
{
    fn handle(&self, connection: Connection) {
        self(connection)
    }
}

/// A bound, passively listening socket
pub struct Listener {
    socket: Socket,
    local_addr: SocketAddr,
    read_timeout: Duration,
    max_connections: Option<usize>,
}

impl Listener {
    /// Bind to `address:port` and start listening
    pub fn bind(address: &str, port: u16) -> Result<Self> {
        Self::bind_with_backlog(address, port, DEFAULT_BACKLOG)
    }

    /// Bind using the address, port, backlog and limits of `config`
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let mut listener = Self::bind_with_backlog(&config.address, config.port, config.backlog)?;
        listener.read_timeout = config.read_timeout();
        listener.max_connections = config.max_connections;
        Ok(listener)
    }

    fn bind_with_backlog(address: &str, port: u16, backlog: i32) -> Result<Self> {
        let addr = (address, port)
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress(format!("{}:{}", address, port)))?
            .next()
            .ok_or_else(|| Error::InvalidAddress(format!("{}:{}", address, port)))?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;

        socket.bind(&addr.into()).map_err(|source| Error::Bind {
            addr: addr.to_string(),
            source,
        })?;
        socket.listen(backlog).map_err(|source| Error::Listen {
            addr: addr.to_string(),
            source,
        })?;

        // The acceptor polls before accepting, a non-blocking listener keeps
        // a vanished client from stalling it
        socket.set_nonblocking(true)?;

        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| Error::InvalidAddress(addr.to_string()))?;

        info!(addr = %local_addr, "listening");

        Ok(Listener {
            socket,
            local_addr,
            read_timeout: super::connection::DEFAULT_READ_TIMEOUT,
            max_connections: None,
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Set the read timeout given to accepted connections
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Accept one pending connection
    ///
    /// Errors are logged and swallowed so the accept loop can carry on.
    pub fn accept(&self) -> Option<Connection> {
        match self.socket.accept() {
            Ok((socket, _)) => {
                let stream: TcpStream = socket.into();
                if let Err(err) = stream.set_nonblocking(false) {
                    error!(error = %err, "could not configure accepted socket");
                    return None;
                }
                Some(Connection::new(stream).with_timeout(self.read_timeout))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!("no pending connection");
                None
            }
            Err(err) => {
                error!(error = %Error::Accept(err), "could not accept connection");
                None
            }
        }
    }

    /// Run the accept loop on a new thread
    pub fn spawn<H: ConnectionHandler>(self, handler: Arc<H>) -> Result<ServerHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let local_addr = self.local_addr;

        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("sockserve-acceptor".to_string())
            .spawn(move || self.serve(handler, flag))?;

        Ok(ServerHandle {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    /// Run the accept loop on the current thread until `running` is cleared
    ///
    /// Each accepted connection gets its own thread for its whole lifetime.
    /// The listening socket is closed when the loop returns.
    pub fn serve<H: ConnectionHandler>(self, handler: Arc<H>, running: Arc<AtomicBool>) {
        let active = Arc::new(AtomicUsize::new(0));
        let fd = self.socket.as_raw_fd();

        while running.load(Ordering::Acquire) {
            match wait_readable(fd, Some(ACCEPT_POLL_INTERVAL)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    warn!(error = %err, "poll on listener failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                    continue;
                }
            }

            let Some(connection) = self.accept() else {
                continue;
            };

            if let Some(limit) = self.max_connections {
                if active.load(Ordering::Acquire) >= limit {
                    warn!(peer = ?connection.peer_addr(), limit, "connection limit reached, refusing");
                    connection.close();
                    continue;
                }
            }

            debug!(peer = ?connection.peer_addr(), "accepted");

            let guard = ActiveGuard::new(Arc::clone(&active));
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name("sockserve-conn".to_string())
                .spawn(move || {
                    let _guard = guard;
                    handler.handle(connection);
                });

            if let Err(err) = spawned {
                error!(error = %err, "could not spawn connection thread");
            }
        }

        info!(addr = %self.local_addr, "accept loop stopped, closing listener");
    }
}

/// Counts a connection as active for as long as it lives
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        ActiveGuard(counter)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to a running accept loop
pub struct ServerHandle {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server listens on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the accept loop has not been asked to stop
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop accepting new connections
    ///
    /// The acceptor notices within one poll interval and closes the
    /// listening socket. Connections already handed off keep running until
    /// their peer goes away.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!(addr = %self.local_addr, "shutdown requested");
        }
    }

    /// Wait for the accept loop to finish
    pub fn join(mut self) -> thread::Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join(),
            None => Ok(()),
        }
    }
}
