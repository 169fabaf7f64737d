//! HTTP server implementation
//!
//! One request per connection: read, parse, resolve, run the handler, write
//! the response and close.

use super::{parse_request, ContentType, Error, HttpMessage, Method, ParseMode, Request, Result};
use crate::config::ServerConfig;
use crate::net::{self, Connection, ConnectionHandler, Listener, ServerHandle};
use crate::routing::{self, Router};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler of an HTTP route
pub type HttpHandler = Box<dyn Fn(&Request) -> HttpMessage + Send + Sync>;

/// Route registry for HTTP handlers
pub type HttpRouter = Router<HttpHandler>;

impl Router<HttpHandler> {
    /// Register a closure as the handler of `pattern`
    pub fn route<F>(
        &mut self,
        pattern: &str,
        verbs: &[Method],
        content_type: ContentType,
        handler: F,
    ) -> routing::Result<&mut Self>
    where
        F: Fn(&Request) -> HttpMessage + Send + Sync + 'static,
    {
        self.register(pattern, verbs, content_type, Box::new(handler))
    }
}

/// HTTP server
///
/// Owns the router for the lifetime of the server; connection threads share
/// it read-only.
pub struct HttpServer {
    router: Arc<HttpRouter>,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a server with the default configuration
    pub fn new(router: HttpRouter) -> Self {
        Self::with_config(router, ServerConfig::default())
    }

    /// Create a server with an explicit configuration
    pub fn with_config(router: HttpRouter, config: ServerConfig) -> Self {
        HttpServer {
            router: Arc::new(router),
            config,
        }
    }

    /// Get the router
    pub fn router(&self) -> &HttpRouter {
        &self.router
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Parse `input`, resolve its route and run the handler
    ///
    /// Returns the handler's message along with the route's content type.
    pub fn dispatch(&self, input: &[u8]) -> Result<(HttpMessage, ContentType)> {
        let parsed = parse_request(input, ParseMode::Http)?;
        debug!(verb = %parsed.verb, path = %parsed.path, "request");

        let action = self.router.resolve(&parsed.path, parsed.verb)?;
        let params = action.extract_parameters(&parsed.path);

        let request = Request::builder()
            .verb(parsed.verb)
            .path(parsed.path)
            .headers(parsed.headers)
            .body(parsed.body)
            .content_type(parsed.content_type)
            .cookie(parsed.cookie)
            .params(params)
            .query(parsed.query)
            .build();

        let message = (action.handler())(&request);
        Ok((message, action.content_type()))
    }

    /// Bytes to answer `input` with, or `None` if the request is dropped
    pub fn respond(&self, input: &[u8]) -> Option<Vec<u8>> {
        match self.dispatch(input) {
            Ok((message, content_type)) => {
                Some(message.to_wire(content_type, &self.config.server_name))
            }
            Err(err) => {
                log_rejection(&err);
                None
            }
        }
    }

    /// Serve one request on `connection`, then close it
    pub fn handle_connection(&self, connection: Connection) {
        if let Some(input) = connection.read() {
            if let Some(response) = self.respond(&input) {
                if !connection.write(&response) {
                    warn!(peer = ?connection.peer_addr(), error = %Error::WriteFailure, "abandoning connection");
                }
            }
        }

        connection.close();
    }

    /// Bind the configured address and serve on a background thread
    pub fn serve(self) -> net::Result<ServerHandle> {
        let listener = Listener::from_config(&self.config)?;
        info!(addr = %listener.local_addr(), routes = self.router.len(), "HTTP server starting");
        listener.spawn(Arc::new(self))
    }
}

impl ConnectionHandler for HttpServer {
    fn handle(&self, connection: Connection) {
        self.handle_connection(connection);
    }
}

fn log_rejection(err: &Error) {
    match err {
        Error::Route(routing::Error::NoMatchingRoute(path)) => {
            warn!(path = %path, "no route matches, closing without reply")
        }
        Error::Route(routing::Error::VerbNotAllowed { verb, path }) => {
            warn!(verb = %verb, path = %path, "verb not allowed, closing without reply")
        }
        _ => warn!(error = %err, "rejecting request, closing without reply"),
    }
}
