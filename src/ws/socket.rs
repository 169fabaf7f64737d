//! Live WebSocket connections and the registry applications keep them in

use super::frame::{Frame, FrameCodec};
use crate::net::Connection;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// An upgraded connection
///
/// Shared between the connection's reader thread and any thread that sends
/// to it; every method takes `&self`.
#[derive(Debug)]
pub struct WebSocket {
    connection: Connection,
    token: String,
    payload: Option<Value>,
}

impl WebSocket {
    pub(crate) fn new(connection: Connection, token: String, payload: Option<Value>) -> Self {
        WebSocket {
            connection,
            token,
            payload,
        }
    }

    /// Identifier of this socket (its `Sec-WebSocket-Accept` value)
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Data the route handler attached during the handshake
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Get peer address
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.peer_addr()
    }

    /// Whether the socket is still open
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Send `message` as a single text frame
    pub fn send(&self, message: &[u8]) -> bool {
        self.send_frame(&Frame::text(message.to_vec()))
    }

    /// Send an arbitrary frame
    pub fn send_frame(&self, frame: &Frame) -> bool {
        self.write_raw(&FrameCodec::encode(frame))
    }

    pub(crate) fn write_raw(&self, bytes: &[u8]) -> bool {
        self.connection.write(bytes)
    }

    pub(crate) fn read(&self) -> Option<Vec<u8>> {
        self.connection.read()
    }

    /// Close the underlying connection
    pub fn close(&self) {
        self.connection.close();
    }
}

/// Send `message` as a text frame to every connected socket in `sockets`
///
/// The frame is encoded once. Returns how many sockets it was written to.
pub fn broadcast_message<I>(message: &[u8], sockets: I) -> usize
where
    I: IntoIterator,
    I::Item: AsRef<WebSocket>,
{
    let encoded = FrameCodec::encode(&Frame::text(message.to_vec()));

    sockets
        .into_iter()
        .filter(|socket| {
            let socket: &WebSocket = socket.as_ref();
            socket.is_connected() && socket.write_raw(&encoded)
        })
        .count()
}

/// Sockets keyed by token
///
/// Cloning yields another handle on the same registry.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    sockets: Arc<Mutex<HashMap<String, Arc<WebSocket>>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a socket, replacing any socket with the same token
    pub fn insert(&self, socket: Arc<WebSocket>) -> Option<Arc<WebSocket>> {
        let token = socket.token().to_string();
        let previous = self.sockets.lock().insert(token, socket);
        debug!(sockets = self.len(), "socket registered");
        previous
    }

    /// Remove the socket registered under `token`
    pub fn remove(&self, token: &str) -> Option<Arc<WebSocket>> {
        self.sockets.lock().remove(token)
    }

    /// Look up a socket by token
    pub fn get(&self, token: &str) -> Option<Arc<WebSocket>> {
        self.sockets.lock().get(token).cloned()
    }

    /// Number of registered sockets
    pub fn len(&self) -> usize {
        self.sockets.lock().len()
    }

    /// Whether no socket is registered
    pub fn is_empty(&self) -> bool {
        self.sockets.lock().is_empty()
    }

    /// All registered sockets
    pub fn snapshot(&self) -> Vec<Arc<WebSocket>> {
        self.sockets.lock().values().cloned().collect()
    }

    /// All registered sockets except the one with `token`
    pub fn others(&self, token: &str) -> Vec<Arc<WebSocket>> {
        self.sockets
            .lock()
            .values()
            .filter(|socket| socket.token() != token)
            .cloned()
            .collect()
    }

    /// Drop sockets that have disconnected, returning how many were removed
    pub fn prune(&self) -> usize {
        let mut sockets = self.sockets.lock();
        let before = sockets.len();
        sockets.retain(|_, socket| socket.is_connected());
        before - sockets.len()
    }
}
