//! Demo application: a small HTTP API and a WebSocket chat room
//!
//! ```text
//! GET  http://127.0.0.1:8888/hello           -> "hello world"
//! GET  http://127.0.0.1:8888/user/{token}/   -> JSON profile
//! GET  ws://127.0.0.1:8889/ws                 -> chat, messages go to every other client
//! ```

use clap::Parser;
use serde_json::json;
use sockserve::http::{ContentType, HttpMessage, HttpRouter, HttpServer, Method};
use sockserve::ws::{broadcast_message, ConnectionRegistry, SocketHandler, WebSocket, WsMessage, WsRouter, WsServer};
use sockserve::{logging, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sockserve-demo")]
#[command(about = "HTTP and WebSocket demo server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind, overrides the configuration file
    #[arg(short, long)]
    address: Option<String>,

    #[arg(long, default_value_t = 8888)]
    http_port: u16,

    #[arg(long, default_value_t = 8889)]
    ws_port: u16,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "sockserve=info,sockserve_demo=info")]
    log: String,
}

/// Relays every message to all other connected clients
struct ChatRoom {
    sockets: ConnectionRegistry,
}

impl SocketHandler for ChatRoom {
    fn on_socket_connected(&self, socket: Arc<WebSocket>) {
        tracing::info!(token = socket.token(), payload = ?socket.payload(), "client joined");
        self.sockets.insert(socket);
    }

    fn on_message_received(&self, socket: &Arc<WebSocket>, message: &[u8]) {
        let delivered = broadcast_message(message, self.sockets.others(socket.token()));
        tracing::info!(token = socket.token(), bytes = message.len(), delivered, "message relayed");
    }

    fn on_socket_disconnected(&self, socket: &Arc<WebSocket>) {
        self.sockets.remove(socket.token());
        tracing::info!(token = socket.token(), remaining = self.sockets.len(), "client left");
    }
}

fn http_routes() -> Result<HttpRouter, Box<dyn std::error::Error>> {
    let mut router = HttpRouter::new();
    router
        .route("/hello", &[Method::Get], ContentType::TextHtml, |req| {
            tracing::debug!(params = ?req.params(), "hello");
            HttpMessage::new("hello world")
        })?
        .route("/user/{token}/", &[Method::Get], ContentType::ApplicationJson, |req| {
            let profile = json!({
                "success": true,
                "data": {
                    "name": "Jason",
                    "email": "jsflax@seraph.com",
                    "token": req.param("token"),
                }
            });
            HttpMessage::json(&profile).unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to serialize profile");
                HttpMessage::empty()
            })
        })?;
    Ok(router)
}

fn ws_routes() -> Result<WsRouter, Box<dyn std::error::Error>> {
    let mut router = WsRouter::new();
    router.route("/ws", &[Method::Get], ContentType::ApplicationJson, |_req| {
        WsMessage::new(json!({ "success": true }))
    })?;
    Ok(router)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_some() {
        logging::init();
    } else {
        logging::init_with_filter(&cli.log);
    }

    let mut base = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = cli.address {
        base.address = address;
    }
    base.validate()?;

    let http_config = ServerConfig {
        port: cli.http_port,
        ..base.clone()
    };
    let ws_config = ServerConfig {
        port: cli.ws_port,
        ..base
    };

    let chat = ChatRoom {
        sockets: ConnectionRegistry::new(),
    };

    let http = HttpServer::with_config(http_routes()?, http_config).serve()?;
    let ws = WsServer::with_config(ws_routes()?, chat, ws_config).serve()?;

    tracing::info!(http = %http.local_addr(), ws = %ws.local_addr(), "demo running");

    if http.join().is_err() {
        tracing::error!("HTTP acceptor panicked");
    }
    if ws.join().is_err() {
        tracing::error!("WebSocket acceptor panicked");
    }

    Ok(())
}
