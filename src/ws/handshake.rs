//! Opening handshake (RFC 6455 Section 4.2)

use crate::http::{ContentType, HttpMessage, Status, CRLF};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// GUID appended to the client key before hashing
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute `Sec-WebSocket-Accept` for a client's `Sec-WebSocket-Key`
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// `101 Switching Protocols` response confirming the upgrade
pub fn switching_protocols(accept: &str) -> Vec<u8> {
    let mut response = Status::SWITCHING_PROTOCOLS.status_line();
    for (name, value) in [
        ("Upgrade", "websocket"),
        ("Connection", "Upgrade"),
        ("Sec-WebSocket-Accept", accept),
    ] {
        response.push_str(name);
        response.push_str(": ");
        response.push_str(value);
        response.push_str(CRLF);
    }
    response.push_str(CRLF);
    response.into_bytes()
}

/// `400 Bad Request` response for a refused upgrade
pub fn bad_request(server_name: &str) -> Vec<u8> {
    HttpMessage::empty().to_wire(ContentType::NoneType, server_name)
}
