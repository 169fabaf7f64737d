//! Integration tests for the WebSocket layer
//!
//! A chat server relays every message to all other connected clients; the
//! tests drive it through raw `TcpStream`s speaking the client side of the
//! protocol.

use parking_lot::Mutex;
use serde_json::{json, Value};
use sockserve::http::{ContentType, Method};
use sockserve::net::ServerHandle;
use sockserve::ws::{
    accept_key, broadcast_message, ConnectionRegistry, Frame, FrameCodec, Opcode, SocketHandler,
    WebSocket, WsMessage, WsRouter, WsServer, CLOSE_TOO_BIG, MAX_PAYLOAD_SIZE,
};
use sockserve::ServerConfig;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const MASK: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];

struct Chat {
    sockets: ConnectionRegistry,
    payloads: Arc<Mutex<Vec<Value>>>,
}

impl SocketHandler for Chat {
    fn on_socket_connected(&self, socket: Arc<WebSocket>) {
        if let Some(payload) = socket.payload() {
            self.payloads.lock().push(payload.clone());
        }
        self.sockets.insert(socket);
    }

    fn on_message_received(&self, socket: &Arc<WebSocket>, message: &[u8]) {
        broadcast_message(message, self.sockets.others(socket.token()));
    }

    fn on_socket_disconnected(&self, socket: &Arc<WebSocket>) {
        self.sockets.remove(socket.token());
    }
}

struct TestServer {
    handle: ServerHandle,
    sockets: ConnectionRegistry,
    payloads: Arc<Mutex<Vec<Value>>>,
}

impl TestServer {
    fn start() -> Self {
        let mut router = WsRouter::new();
        router
            .route("/ws", &[Method::Get], ContentType::ApplicationJson, |_req| {
                WsMessage::new(json!({ "success": true }))
            })
            .unwrap()
            .route("/room/{name}", &[Method::Get], ContentType::ApplicationJson, |req| {
                WsMessage::new(json!({ "room": req.param("name") }))
            })
            .unwrap();

        let sockets = ConnectionRegistry::new();
        let payloads = Arc::new(Mutex::new(Vec::new()));
        let chat = Chat {
            sockets: sockets.clone(),
            payloads: Arc::clone(&payloads),
        };

        let config = ServerConfig::new("127.0.0.1", 0).read_timeout_secs(5);
        let handle = WsServer::with_config(router, chat, config).serve().unwrap();

        TestServer {
            handle,
            sockets,
            payloads,
        }
    }

    fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// Wait until `count` sockets are registered
    fn wait_for_sockets(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.sockets.len() != count {
            assert!(Instant::now() < deadline, "expected {} sockets", count);
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

/// Client side of one WebSocket connection
struct Client {
    stream: TcpStream,
    buffer: Vec<u8>,
    accept: String,
}

impl Client {
    fn connect(addr: SocketAddr, path: &str, key: &str) -> Self {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\n\
             Connection: Upgrade\r\nSec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            path, key
        )
        .unwrap();

        let head = read_head(&mut stream);
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "{}", head);
        assert!(head.contains("Upgrade: websocket\r\n"));
        assert!(head.contains("Connection: Upgrade\r\n"));

        let accept = head
            .lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Accept: "))
            .unwrap()
            .to_string();

        Client {
            stream,
            buffer: Vec::new(),
            accept,
        }
    }

    fn send(&mut self, frame: &Frame) {
        self.stream
            .write_all(&FrameCodec::encode_masked(frame, MASK))
            .unwrap();
    }

    fn send_text(&mut self, text: &str) {
        self.send(&Frame::text(text.to_string()));
    }

    fn recv(&mut self) -> Frame {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some((frame, used)) = FrameCodec::decode(&self.buffer).unwrap() {
                self.buffer.drain(..used);
                return frame;
            }
            let n = self.stream.read(&mut chunk).unwrap();
            assert!(n > 0, "connection closed while waiting for a frame");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Whether nothing arrives within `wait`
    fn is_quiet(&mut self, wait: Duration) -> bool {
        self.stream.set_read_timeout(Some(wait)).unwrap();
        let mut chunk = [0u8; 64];
        let quiet = match self.stream.read(&mut chunk) {
            Ok(n) => n == 0 && self.buffer.is_empty(),
            Err(_) => self.buffer.is_empty(),
        };
        self.stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        quiet
    }

    fn read_to_end(&mut self) -> Vec<u8> {
        let mut rest = std::mem::take(&mut self.buffer);
        self.stream.read_to_end(&mut rest).unwrap();
        rest
    }
}

fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).unwrap() == 0 {
            break;
        }
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

#[test]
fn test_handshake_accept_key() {
    let server = TestServer::start();

    let client = Client::connect(server.addr(), "/ws", "dGhlIHNhbXBsZSBub25jZQ==");
    assert_eq!(client.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");

    let other = Client::connect(server.addr(), "/ws", "c2Vjb25kLWNsaWVudC0wMA==");
    assert_eq!(other.accept, accept_key("c2Vjb25kLWNsaWVudC0wMA=="));

    server.wait_for_sockets(2);
    assert!(server.sockets.get(&client.accept).is_some());
}

#[test]
fn test_handler_payload_attached() {
    let server = TestServer::start();

    let _client = Client::connect(server.addr(), "/room/lobby", "cm9vbS1wYXlsb2FkLWtleQ==");
    server.wait_for_sockets(1);

    assert_eq!(server.payloads.lock().as_slice(), &[json!({ "room": "lobby" })]);
}

#[test]
fn test_broadcast_to_other_clients() {
    let server = TestServer::start();

    let mut alice = Client::connect(server.addr(), "/ws", "YWxpY2Uta2V5LTAwMDAwMA==");
    let mut bob = Client::connect(server.addr(), "/ws", "Ym9iLWtleS0wMDAwMDAwMA==");
    let mut carol = Client::connect(server.addr(), "/ws", "Y2Fyb2wta2V5LTAwMDAwMA==");
    server.wait_for_sockets(3);

    alice.send_text("hi all");

    for peer in [&mut bob, &mut carol] {
        let frame = peer.recv();
        assert_eq!(frame.opcode, Opcode::Text);
        assert!(frame.is_final);
        assert_eq!(frame.payload(), b"hi all");
    }

    assert!(alice.is_quiet(Duration::from_millis(200)));
}

#[test]
fn test_ping_is_echoed() {
    let server = TestServer::start();
    let mut client = Client::connect(server.addr(), "/ws", "cGluZy1rZXktMDAwMDAwMA==");

    client.send(&Frame::new(true, Opcode::Ping, Some("are you there".into())));
    let reply = client.recv();
    assert_eq!(reply.opcode, Opcode::Ping);
    assert_eq!(reply.payload(), b"are you there");
}

#[test]
fn test_pong_is_echoed() {
    let server = TestServer::start();
    let mut client = Client::connect(server.addr(), "/ws", "cG9uZy1rZXktMDAwMDAwMA==");

    client.send(&Frame::new(true, Opcode::Pong, Some("still here".into())));
    let reply = client.recv();
    assert_eq!(reply.opcode, Opcode::Pong);
    assert!(reply.is_final);
    assert_eq!(reply.payload(), b"still here");
}

#[test]
fn test_close_handshake() {
    let server = TestServer::start();
    let mut client = Client::connect(server.addr(), "/ws", "Y2xvc2Uta2V5LTAwMDAwMA==");
    server.wait_for_sockets(1);

    client.send(&Frame::close(1000, "done"));
    let reply = client.recv();
    assert_eq!(reply.opcode, Opcode::Close);
    assert_eq!(reply.close_code(), Some(1000));

    assert!(client.read_to_end().is_empty());
    server.wait_for_sockets(0);
}

#[test]
fn test_unknown_opcode_closes() {
    let server = TestServer::start();
    let mut client = Client::connect(server.addr(), "/ws", "b3Bjb2RlLWtleS0wMDAwMA==");

    // Reserved non-control opcode 0x3
    client.stream.write_all(&[0x83, 0x80, 1, 2, 3, 4]).unwrap();
    let reply = client.recv();
    assert_eq!(reply.opcode, Opcode::Close);

    assert!(client.read_to_end().is_empty());
}

#[test]
fn test_lone_fragment_dropped() {
    let server = TestServer::start();
    let mut sender = Client::connect(server.addr(), "/ws", "ZnJhZ21lbnQta2V5LTAwMA==");
    let mut receiver = Client::connect(server.addr(), "/ws", "ZnJhZ21lbnQtcGVlci0wMA==");
    server.wait_for_sockets(2);

    sender.send(&Frame::new(false, Opcode::Text, Some("par".into())));
    sender.send_text("whole");

    let frame = receiver.recv();
    assert_eq!(frame.payload(), b"whole");
    assert!(receiver.is_quiet(Duration::from_millis(200)));
    assert_eq!(server.sockets.len(), 2);
}

#[test]
fn test_oversized_frame_closes() {
    let server = TestServer::start();
    let mut client = Client::connect(server.addr(), "/ws", "b3ZlcnNpemUta2V5LTAwMA==");
    server.wait_for_sockets(1);

    // Header announcing one byte over the limit, no payload follows
    let mut header = vec![0x82, 0x80 | 127];
    header.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_be_bytes());
    header.extend_from_slice(&MASK);
    client.stream.write_all(&header).unwrap();

    let reply = client.recv();
    assert_eq!(reply.opcode, Opcode::Close);
    assert_eq!(reply.close_code(), Some(CLOSE_TOO_BIG));

    assert!(client.read_to_end().is_empty());
    server.wait_for_sockets(0);
}

#[test]
fn test_frames_split_and_batched() {
    let server = TestServer::start();
    let mut sender = Client::connect(server.addr(), "/ws", "c2VuZGVyLWtleS0wMDAwMA==");
    let mut receiver = Client::connect(server.addr(), "/ws", "cmVjZWl2ZXIta2V5LTAwMA==");
    server.wait_for_sockets(2);

    // One frame delivered in two reads
    let wire = FrameCodec::encode_masked(&Frame::text("split across reads"), MASK);
    let (first, second) = wire.split_at(5);
    sender.stream.write_all(first).unwrap();
    sender.stream.flush().unwrap();
    thread::sleep(Duration::from_millis(100));
    sender.stream.write_all(second).unwrap();
    assert_eq!(receiver.recv().payload(), b"split across reads");

    // Two frames delivered in one read
    let mut batch = FrameCodec::encode_masked(&Frame::text("one"), MASK).to_vec();
    batch.extend_from_slice(&FrameCodec::encode_masked(&Frame::text("two"), MASK));
    sender.stream.write_all(&batch).unwrap();
    assert_eq!(receiver.recv().payload(), b"one");
    assert_eq!(receiver.recv().payload(), b"two");
}

#[test]
fn test_large_message() {
    let server = TestServer::start();
    let mut sender = Client::connect(server.addr(), "/ws", "bGFyZ2Utc2VuZGVyLTAwMA==");
    let mut receiver = Client::connect(server.addr(), "/ws", "bGFyZ2UtcmVjZWl2ZXItMA==");
    server.wait_for_sockets(2);

    let text = "x".repeat(70_000);
    sender.send_text(&text);

    let frame = receiver.recv();
    assert_eq!(frame.payload_len(), 70_000);
    assert_eq!(frame.payload(), text.as_bytes());
}

#[test]
fn test_refused_upgrade() {
    let server = TestServer::start();

    let mut stream = TcpStream::connect(server.addr()).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
        .write_all(b"GET /nowhere HTTP/1.1\r\nSec-WebSocket-Key: abc\r\n\r\n")
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    assert_eq!(
        response,
        "HTTP/1.1 400 Bad Request\r\nServer: sockserve\r\nConnection: close\r\n\r\n"
    );
    assert!(server.sockets.is_empty());
}
