//! Socket transport
//!
//! Thin layer over stream sockets used by both protocol handlers:
//!
//! - [`Listener`] binds, listens and runs the accept loop, handing each
//!   accepted [`Connection`] to its own thread
//! - [`Connection`] offers "read what is ready now" reads bounded by a
//!   timeout, full writes and an idempotent close
//!
//! Transport failures never cross the accept boundary: a failed accept is
//! logged and the loop keeps going, a failed read closes the connection and
//! a failed write is reported as `false` so the caller can give up on it.

pub mod connection;
pub mod listener;

pub use connection::Connection;
pub use listener::{ConnectionHandler, Listener, ServerHandle};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Size of the scratch buffer used for each non-blocking receive
pub const READ_CHUNK_SIZE: usize = 4096;

/// Pending connection queue length handed to `listen(2)`
pub const DEFAULT_BACKLOG: i32 = 128;
