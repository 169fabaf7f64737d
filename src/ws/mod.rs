//! WebSocket server (RFC 6455)
//!
//! A WebSocket connection starts as an HTTP request on a route registered in
//! a [`WsRouter`]. A successful handshake answers `101 Switching Protocols`
//! and hands the connection, now a [`WebSocket`], to the application's
//! [`SocketHandler`]; the connection's thread then reads frames until the
//! peer closes or goes quiet for longer than the read timeout.
//!
//! # Frame handling
//!
//! | Frame                         | Action                                   |
//! |-------------------------------|------------------------------------------|
//! | final text / binary           | `on_message_received`                    |
//! | non-final text / binary       | dropped with a warning                   |
//! | continuation                  | close with status 1002                   |
//! | close                         | answer with a normal close, disconnect   |
//! | ping / pong                   | written back unchanged                   |
//!
//! Fragmented messages are not reassembled.

pub mod frame;
pub mod handshake;
pub mod server;
pub mod socket;

pub use frame::{Frame, FrameCodec, Opcode};
pub use handshake::{accept_key, WEBSOCKET_GUID};
pub use server::{Handshake, SocketHandler, WsHandler, WsMessage, WsRouter, WsServer};
pub use socket::{broadcast_message, ConnectionRegistry, WebSocket};

/// Result type for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] crate::http::Error),

    #[error("Routing error: {0}")]
    Route(#[from] crate::routing::Error),

    #[error("Network error: {0}")]
    Network(#[from] crate::net::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Frame payload of {0} bytes exceeds the limit")]
    FrameTooLarge(u64),

    #[error("Write failed")]
    WriteFailure,
}

/// Close status: normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close status: protocol error
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Close status: message too big
pub const CLOSE_TOO_BIG: u16 = 1009;

/// Largest frame payload accepted from a client (16 MiB)
pub const MAX_PAYLOAD_SIZE: u64 = 16 * 1024 * 1024;
