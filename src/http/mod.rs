//! HTTP/1.1 protocol handler
//!
//! Turns the bytes of one request into a [`Request`], resolves it against
//! an [`HttpRouter`], runs the matched handler and writes its
//! [`HttpMessage`] back as an HTTP/1.1 response.
//!
//! # Examples
//!
//! ```no_run
//! use sockserve::config::ServerConfig;
//! use sockserve::http::{ContentType, HttpMessage, HttpRouter, HttpServer, Method};
//!
//! let mut router = HttpRouter::new();
//! router
//!     .route("/hello", &[Method::Get], ContentType::TextHtml, |_req| {
//!         HttpMessage::new("hello world")
//!     })
//!     .unwrap();
//!
//! let handle = HttpServer::with_config(router, ServerConfig::new("127.0.0.1", 8080))
//!     .serve()
//!     .unwrap();
//! handle.join().unwrap();
//! ```
//!
//! A request is served on its connection's own thread and the connection
//! is closed once the response is written. Requests that fail to parse, match
//! no route or use a verb the route does not allow are dropped without a
//! reply.

pub mod headers;
pub mod message;
pub mod parser;
pub mod server;

pub use headers::Headers;
pub use message::{ContentType, HttpMessage, Method, Request, RequestBuilder, Status};
pub use parser::{parse_request, ParseMode, ParsedRequest};
pub use server::{HttpHandler, HttpRouter, HttpServer};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] crate::net::Error),

    #[error("Routing error: {0}")]
    Route(#[from] crate::routing::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported HTTP verb: {0}")]
    UnsupportedVerb(String),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Empty request")]
    Incomplete,

    #[error("Write failed")]
    WriteFailure,
}

/// Maximum number of headers per message
pub const MAX_HEADERS: usize = 64;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
