//! HTTP request parsing
//!
//! Requests are parsed from whatever the transport has buffered, line by
//! line. Lines end at `\n` and are trimmed of CR, spaces and NUL bytes; the
//! first empty line ends the header block and everything after it is body.

use super::{ContentType, Error, Headers, Method, Result};
use tracing::trace;

/// Which header fields get dedicated treatment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Plain request: for non-GET verbs `Content-Length`, `Content-Type`
    /// and `Cookie` are parsed out and the body is kept
    Http,
    /// WebSocket upgrade: `Sec-WebSocket-Key` is parsed out, no body
    Handshake,
}

/// A parsed request before route resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub verb: Method,
    /// Path with the query string stripped
    pub path: String,
    /// Raw query string, without the `?`
    pub query: Option<String>,
    pub headers: Headers,
    pub content_type: ContentType,
    pub content_length: Option<usize>,
    pub cookie: Option<String>,
    pub websocket_key: Option<String>,
    pub body: Vec<u8>,
}

/// Characters stripped from both ends of every line
fn is_line_padding(c: char) -> bool {
    matches!(c, '\r' | '\n' | ' ' | '\0')
}

/// Split off the next line, returning it and the rest of the input
fn next_line(buf: &[u8]) -> (&[u8], &[u8]) {
    match buf.iter().position(|&b| b == b'\n') {
        Some(pos) => (&buf[..pos], &buf[pos + 1..]),
        None => (buf, &[]),
    }
}

/// Parse a request line into its verb and target
///
/// Format: VERB TARGET VERSION
/// Example: GET /index.html?x=1 HTTP/1.1
pub fn parse_request_line(line: &str) -> Result<(Method, String)> {
    let verb = Method::from_request_line(line).ok_or_else(|| {
        Error::UnsupportedVerb(line.split(' ').next().unwrap_or_default().to_string())
    })?;

    let target = line
        .split(' ')
        .filter(|part| !part.is_empty())
        .nth(1)
        .ok_or_else(|| Error::Parse(format!("Missing request target: {}", line)))?;

    Ok((verb, target.trim().to_string()))
}

/// Split a request target into path and query string
pub fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

/// Parse the bytes of one request
pub fn parse_request(input: &[u8], mode: ParseMode) -> Result<ParsedRequest> {
    let (first, mut rest) = next_line(input);
    let request_line = String::from_utf8_lossy(first);
    let request_line = request_line.trim_matches(is_line_padding);

    if request_line.is_empty() {
        return Err(Error::Incomplete);
    }

    let (verb, target) = parse_request_line(request_line)?;
    let (path, query) = split_target(&target);

    let mut parsed = ParsedRequest {
        verb,
        path,
        query,
        headers: Headers::new(),
        content_type: ContentType::NoneType,
        content_length: None,
        cookie: None,
        websocket_key: None,
        body: Vec::new(),
    };

    let parse_entity_fields = mode == ParseMode::Http && verb != Method::Get;

    while !rest.is_empty() {
        let (raw, remaining) = next_line(rest);
        rest = remaining;

        let line = String::from_utf8_lossy(raw);
        let line = line.trim_matches(is_line_padding);
        if line.is_empty() {
            break;
        }

        // Malformed lines are dropped
        let Ok((name, value)) = Headers::parse_header_line(line) else {
            trace!(line, "dropping malformed header line");
            continue;
        };

        if parse_entity_fields && name.eq_ignore_ascii_case("content-length") {
            let length = value
                .parse::<usize>()
                .map_err(|_| Error::Parse(format!("Invalid Content-Length: {}", value)))?;
            parsed.content_length = Some(length);
        } else if parse_entity_fields && name.eq_ignore_ascii_case("content-type") {
            parsed.content_type = ContentType::from_str(&value)?;
        } else if parse_entity_fields && name.eq_ignore_ascii_case("cookie") {
            parsed.cookie = Some(value);
        } else if mode == ParseMode::Handshake && name.eq_ignore_ascii_case("sec-websocket-key") {
            parsed.websocket_key = Some(value);
        } else {
            parsed.headers.insert(name, value);
        }
    }

    if parse_entity_fields {
        let mut body = rest.to_vec();
        if let Some(length) = parsed.content_length {
            body.truncate(length);
        }
        parsed.body = body;
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let (verb, target) = parse_request_line("GET /index.html HTTP/1.1").unwrap();
        assert_eq!(verb, Method::Get);
        assert_eq!(target, "/index.html");

        assert!(matches!(
            parse_request_line("BREW /pot HTTP/1.1"),
            Err(Error::UnsupportedVerb(v)) if v == "BREW"
        ));
        assert!(matches!(parse_request_line("GET"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/a/b"), ("/a/b".to_string(), None));
        assert_eq!(
            split_target("/a?x=1&y=2"),
            ("/a".to_string(), Some("x=1&y=2".to_string()))
        );
    }

    #[test]
    fn test_parse_simple_get() {
        let req = parse_request(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n", ParseMode::Http).unwrap();
        assert_eq!(req.verb, Method::Get);
        assert_eq!(req.path, "/hello");
        assert_eq!(req.query, None);
        assert_eq!(req.headers.get("host"), Some("x"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_get_ignores_entity_fields() {
        let input = b"GET /x HTTP/1.1\r\nContent-Type: application/xml\r\nCookie: a=1\r\n\r\nignored";
        let req = parse_request(input, ParseMode::Http).unwrap();
        assert_eq!(req.content_type, ContentType::NoneType);
        assert_eq!(req.cookie, None);
        assert_eq!(req.headers.get("Content-Type"), Some("application/xml"));
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_parse_post_with_body() {
        let input = b"POST /data?v=1 HTTP/1.1\r\n\
            Host: localhost\r\n\
            content-type: application/json\r\n\
            CONTENT-LENGTH: 13\r\n\
            Cookie: session=abc\r\n\
            \r\n\
            {\"a\":\"line\n\"}";
        let req = parse_request(input, ParseMode::Http).unwrap();

        assert_eq!(req.verb, Method::Post);
        assert_eq!(req.path, "/data");
        assert_eq!(req.query.as_deref(), Some("v=1"));
        assert_eq!(req.content_type, ContentType::ApplicationJson);
        assert_eq!(req.content_length, Some(13));
        assert_eq!(req.cookie.as_deref(), Some("session=abc"));
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.body, b"{\"a\":\"line\n\"}");
    }

    #[test]
    fn test_body_truncated_to_content_length() {
        let input = b"PUT /x HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcdef";
        let req = parse_request(input, ParseMode::Http).unwrap();
        assert_eq!(req.body, b"abc");
    }

    #[test]
    fn test_body_without_content_length() {
        let input = b"DELETE /x HTTP/1.1\r\n\r\nwhatever is left";
        let req = parse_request(input, ParseMode::Http).unwrap();
        assert_eq!(req.body, b"whatever is left");
    }

    #[test]
    fn test_unknown_content_type_fails() {
        let input = b"POST /x HTTP/1.1\r\nContent-Type: application/xml\r\n\r\n<a/>";
        assert!(matches!(
            parse_request(input, ParseMode::Http),
            Err(Error::UnknownContentType(t)) if t == "application/xml"
        ));
    }

    #[test]
    fn test_invalid_content_length_fails() {
        let input = b"POST /x HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        assert!(matches!(parse_request(input, ParseMode::Http), Err(Error::Parse(_))));
    }

    #[test]
    fn test_unsupported_verb_fails() {
        let input = b"OPTIONS /x HTTP/1.1\r\n\r\n";
        assert!(matches!(
            parse_request(input, ParseMode::Http),
            Err(Error::UnsupportedVerb(_))
        ));
    }

    #[test]
    fn test_malformed_headers_dropped() {
        let input = b"GET /x HTTP/1.1\r\nno-colon-here\r\nX-Empty:\r\nX-Ok: yes\r\n\r\n";
        let req = parse_request(input, ParseMode::Http).unwrap();
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.headers.get("x-ok"), Some("yes"));
    }

    #[test]
    fn test_bare_newlines_and_padding() {
        let input = b"GET /x HTTP/1.1\n  Host: y \0\n\n";
        let req = parse_request(input, ParseMode::Http).unwrap();
        assert_eq!(req.headers.get("Host"), Some("y"));
    }

    #[test]
    fn test_handshake_mode_extracts_key() {
        let input = b"GET /ws?room=1 HTTP/1.1\r\n\
            Host: server.example.com\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";
        let req = parse_request(input, ParseMode::Handshake).unwrap();
        assert_eq!(req.path, "/ws");
        assert_eq!(req.query.as_deref(), Some("room=1"));
        assert_eq!(req.websocket_key.as_deref(), Some("dGhlIHNhbXBsZSBub25jZQ=="));
        assert!(!req.headers.contains("Sec-WebSocket-Key"));
        assert_eq!(req.headers.get("upgrade"), Some("websocket"));
    }

    #[test]
    fn test_handshake_mode_skips_entity_fields() {
        let input = b"POST /ws HTTP/1.1\r\nContent-Type: application/xml\r\n\r\nbody";
        let req = parse_request(input, ParseMode::Handshake).unwrap();
        assert_eq!(req.verb, Method::Post);
        assert_eq!(req.content_type, ContentType::NoneType);
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_request(b"", ParseMode::Http), Err(Error::Incomplete)));
        assert!(matches!(parse_request(b"\r\n", ParseMode::Http), Err(Error::Incomplete)));
    }
}
