//! sockserve - HTTP/1.1 and WebSocket server over raw TCP sockets
//!
//! This crate provides a small server framework: a thread-per-connection
//! TCP listener, a pattern router with `{name}` path parameters, a
//! one-request-per-connection HTTP responder and a WebSocket server that
//! upgrades connections and dispatches frames to application callbacks.

pub mod config;
pub mod http;
pub mod logging;
pub mod net;
pub mod routing;
pub mod ws;

pub use config::ServerConfig;
