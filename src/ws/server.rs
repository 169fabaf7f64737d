//! WebSocket server: handshake, then the frame loop

use super::frame::{Frame, FrameCodec, Opcode};
use super::handshake::{accept_key, bad_request, switching_protocols};
use super::socket::WebSocket;
use super::{Error, Result, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, CLOSE_TOO_BIG};
use crate::config::ServerConfig;
use crate::http::{parse_request, ContentType, Method, ParseMode, Request};
use crate::net::{self, Connection, ConnectionHandler, Listener, ServerHandle, READ_CHUNK_SIZE};
use crate::routing::{self, Router};
use bytes::{Buf, BytesMut};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What a WebSocket route handler hands back
///
/// The payload ends up on the [`WebSocket`] as [`WebSocket::payload`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WsMessage {
    payload: Option<Value>,
}

impl WsMessage {
    /// Message carrying `payload`
    pub fn new(payload: Value) -> Self {
        WsMessage {
            payload: Some(payload),
        }
    }

    /// Message without payload
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the payload
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Take the payload out of the message
    pub fn into_payload(self) -> Option<Value> {
        self.payload
    }
}

/// Handler of a WebSocket route, run once per handshake
pub type WsHandler = Box<dyn Fn(&Request) -> WsMessage + Send + Sync>;

/// Route registry for WebSocket handlers
pub type WsRouter = Router<WsHandler>;

impl Router<WsHandler> {
    /// Register a closure as the handshake handler of `pattern`
    pub fn route<F>(
        &mut self,
        pattern: &str,
        verbs: &[Method],
        content_type: ContentType,
        handler: F,
    ) -> routing::Result<&mut Self>
    where
        F: Fn(&Request) -> WsMessage + Send + Sync + 'static,
    {
        self.register(pattern, verbs, content_type, Box::new(handler))
    }
}

/// Application callbacks for socket lifecycle events
///
/// Called from each socket's own connection thread, so implementations see
/// concurrent calls for different sockets.
pub trait SocketHandler: Send + Sync + 'static {
    /// A handshake completed
    fn on_socket_connected(&self, socket: Arc<WebSocket>);

    /// A final text or binary frame arrived
    fn on_message_received(&self, socket: &Arc<WebSocket>, message: &[u8]);

    /// The socket closed and its thread is about to exit
    fn on_socket_disconnected(&self, _socket: &Arc<WebSocket>) {}
}

/// Outcome of an accepted handshake
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// `Sec-WebSocket-Accept` value, also the socket's token
    pub accept_key: String,
    /// Payload from the route handler
    pub payload: Option<Value>,
}

/// WebSocket server
pub struct WsServer<S: SocketHandler> {
    router: Arc<WsRouter>,
    handler: Arc<S>,
    config: ServerConfig,
}

impl<S: SocketHandler> WsServer<S> {
    /// Create a server with the default configuration
    pub fn new(router: WsRouter, handler: S) -> Self {
        Self::with_config(router, handler, ServerConfig::default())
    }

    /// Create a server with an explicit configuration
    pub fn with_config(router: WsRouter, handler: S, config: ServerConfig) -> Self {
        WsServer {
            router: Arc::new(router),
            handler: Arc::new(handler),
            config,
        }
    }

    /// Get the router
    pub fn router(&self) -> &WsRouter {
        &self.router
    }

    /// Get the socket handler
    pub fn handler(&self) -> &Arc<S> {
        &self.handler
    }

    /// Get the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Validate an upgrade request and run its route handler
    pub fn handshake(&self, input: &[u8]) -> Result<Handshake> {
        let parsed = parse_request(input, ParseMode::Handshake)?;
        debug!(verb = %parsed.verb, path = %parsed.path, "upgrade request");

        let key = parsed
            .websocket_key
            .ok_or_else(|| Error::Handshake("missing Sec-WebSocket-Key".to_string()))?;

        let action = self.router.resolve(&parsed.path, parsed.verb)?;
        let params = action.extract_parameters(&parsed.path);

        let request = Request::builder()
            .verb(parsed.verb)
            .path(parsed.path)
            .headers(parsed.headers)
            .params(params)
            .query(parsed.query)
            .build();

        let message = (action.handler())(&request);

        Ok(Handshake {
            accept_key: accept_key(&key),
            payload: message.into_payload(),
        })
    }

    /// Upgrade `connection` and run it until it closes
    pub fn handle_connection(&self, connection: Connection) {
        let Some(input) = connection.read() else {
            return;
        };

        let handshake = match self.handshake(&input) {
            Ok(handshake) => handshake,
            Err(err) => {
                warn!(peer = ?connection.peer_addr(), error = %err, "refusing upgrade");
                connection.write(&bad_request(&self.config.server_name));
                connection.close();
                return;
            }
        };

        if !connection.write(&switching_protocols(&handshake.accept_key)) {
            warn!(peer = ?connection.peer_addr(), error = %Error::WriteFailure, "abandoning upgrade");
            connection.close();
            return;
        }

        let socket = Arc::new(WebSocket::new(connection, handshake.accept_key, handshake.payload));
        info!(peer = ?socket.peer_addr(), token = socket.token(), "socket connected");

        let _disconnect = Disconnect {
            handler: &*self.handler,
            socket: &socket,
        };
        self.handler.on_socket_connected(Arc::clone(&socket));
        self.run(&socket);
    }

    /// Read and dispatch frames until the socket closes
    fn run(&self, socket: &Arc<WebSocket>) {
        let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);

        while let Some(bytes) = socket.read() {
            buffer.extend_from_slice(&bytes);

            loop {
                match FrameCodec::decode(&buffer) {
                    Ok(Some((frame, consumed))) => {
                        buffer.advance(consumed);
                        self.dispatch(socket, frame);
                        if !socket.is_connected() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(token = socket.token(), error = %err, "closing socket");
                        socket.send_frame(&Frame::close(CLOSE_TOO_BIG, "message too big"));
                        socket.close();
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&self, socket: &Arc<WebSocket>, frame: Frame) {
        trace!(
            token = socket.token(),
            opcode = %frame.opcode,
            fin = frame.is_final,
            len = frame.payload_len(),
            "frame"
        );

        match frame.opcode {
            Opcode::Text | Opcode::Binary if frame.is_final => {
                self.handler.on_message_received(socket, frame.payload());
            }
            Opcode::Text | Opcode::Binary => {
                warn!(token = socket.token(), "fragmented message, dropping frame");
            }
            Opcode::Continuation => {
                warn!(token = socket.token(), "continuation frame, closing socket");
                socket.send_frame(&Frame::close(CLOSE_PROTOCOL_ERROR, "fragmentation not supported"));
                socket.close();
            }
            Opcode::Close => {
                debug!(token = socket.token(), code = ?frame.close_code(), "close requested");
                socket.send_frame(&Frame::close(CLOSE_NORMAL, "normal closure"));
                socket.close();
            }
            Opcode::Ping | Opcode::Pong => {
                socket.send_frame(&frame);
            }
        }
    }

    /// Bind the configured address and serve on a background thread
    pub fn serve(self) -> net::Result<ServerHandle> {
        let listener = Listener::from_config(&self.config)?;
        info!(addr = %listener.local_addr(), routes = self.router.len(), "WebSocket server starting");
        listener.spawn(Arc::new(self))
    }
}

/// Closes the socket and reports the disconnect when dropped, unwinding included
struct Disconnect<'a, S: SocketHandler> {
    handler: &'a S,
    socket: &'a Arc<WebSocket>,
}

impl<S: SocketHandler> Drop for Disconnect<'_, S> {
    fn drop(&mut self) {
        self.socket.close();
        info!(token = self.socket.token(), "socket disconnected");
        self.handler.on_socket_disconnected(self.socket);
    }
}

impl<S: SocketHandler> ConnectionHandler for WsServer<S> {
    fn handle(&self, connection: Connection) {
        self.handle_connection(connection);
    }
}
