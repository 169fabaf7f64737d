//! Connected stream socket
//!
//! A [`Connection`] is shared by reference: the thread that owns the
//! connection reads from it while other threads (broadcasts) may write to
//! it, so every operation takes `&self`. Writes are serialized so that two
//! writers never interleave their bytes on the wire.

use super::{Error, Result, READ_CHUNK_SIZE};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default bounded wait for a read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait until `fd` has data to read (or a pending connection to accept)
///
/// Returns `Ok(false)` if the timeout elapsed first. `None` waits forever.
pub(crate) fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN};

    let mut pfd = pollfd {
        fd,
        events: POLLIN,
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Io(err));
        }

        return Ok(result > 0);
    }
}

/// A connected stream socket
pub struct Connection {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    connected: AtomicBool,
    write_lock: Mutex<()>,
    timeout: Duration,
}

impl Connection {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Connection {
            stream,
            peer,
            connected: AtomicBool::new(true),
            write_lock: Mutex::new(()),
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the bounded wait used by [`Connection::read`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the read timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Remote address, if the OS still knew it at accept time
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Whether the connection has not been closed yet
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Read everything that is ready now
    ///
    /// Waits up to the read timeout for the socket to become readable, then
    /// drains it without blocking. On timeout, end of stream or error the
    /// connection is closed and `None` is returned.
    pub fn read(&self) -> Option<Vec<u8>> {
        match self.try_read() {
            Ok(buf) => Some(buf),
            Err(err) => {
                debug!(peer = ?self.peer, error = %err, "read failed, closing connection");
                self.close();
                None
            }
        }
    }

    /// Same as [`Connection::read`] but reports why nothing was read and
    /// leaves the connection open
    pub fn try_read(&self) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(Error::ConnectionClosed);
        }

        let fd = self.stream.as_raw_fd();
        if !wait_readable(fd, Some(self.timeout))? {
            return Err(Error::Timeout);
        }

        let mut buffer = Vec::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            // MSG_DONTWAIT rather than O_NONBLOCK: writers share this stream
            // and rely on blocking writes
            let n = unsafe {
                libc::recv(
                    fd,
                    chunk.as_mut_ptr() as *mut libc::c_void,
                    chunk.len(),
                    libc::MSG_DONTWAIT,
                )
            };

            if n > 0 {
                buffer.extend_from_slice(&chunk[..n as usize]);
                continue;
            }

            if n == 0 {
                // Peer finished sending
                break;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => break,
                io::ErrorKind::Interrupted => continue,
                _ => return Err(Error::Io(err)),
            }
        }

        if buffer.is_empty() {
            return Err(Error::ConnectionClosed);
        }

        trace!(peer = ?self.peer, bytes = buffer.len(), "read");
        Ok(buffer)
    }

    /// Write all of `bytes`
    ///
    /// Partial writes are retried; `false` means the write failed for good
    /// and the caller should abandon the connection.
    pub fn write(&self, bytes: &[u8]) -> bool {
        let _guard = self.write_lock.lock();

        if !self.is_connected() {
            return false;
        }

        match (&self.stream).write_all(bytes) {
            Ok(()) => {
                trace!(peer = ?self.peer, bytes = bytes.len(), "wrote");
                true
            }
            Err(err) => {
                warn!(peer = ?self.peer, error = %err, "write failed");
                false
            }
        }
    }

    /// Close the connection
    ///
    /// Safe to call any number of times. The descriptor itself is released
    /// when the connection is dropped.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            if let Err(err) = self.stream.shutdown(Shutdown::Both) {
                if err.kind() != io::ErrorKind::NotConnected {
                    debug!(peer = ?self.peer, error = %err, "shutdown failed");
                }
            }
            debug!(peer = ?self.peer, "connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .field("timeout", &self.timeout)
            .finish()
    }
}
