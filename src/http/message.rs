//! HTTP message types
//!
//! This module defines the verbs and content types the server understands,
//! the [`Request`] handed to handlers and the [`HttpMessage`] they return.

use super::{Error, Headers, Result, CRLF};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// HTTP verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Every supported verb, in the order request lines are checked against
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
    ];

    /// Parse method from string
    pub fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::UnsupportedVerb(s.to_string()))
    }

    /// Verb a request line starts with
    ///
    /// Matching is by prefix, as request lines are never tokenized before
    /// the verb is looked up.
    pub fn from_request_line(line: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| line.starts_with(m.as_str()))
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content types a request may declare and a route may respond with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    #[default]
    NoneType,
    All,
    ApplicationOctetStream,
    ApplicationJson,
    ApplicationFormUrlEncoded,
    MultipartFormData,
    TextHtml,
    TextJavascript,
    TextCss,
    ImageWebp,
    ImagePng,
    ImagePngBase64,
    ImageIco,
    FontOpenType,
    FontTrueType,
}

impl ContentType {
    /// Every known content type
    pub const ALL: [ContentType; 15] = [
        ContentType::NoneType,
        ContentType::All,
        ContentType::ApplicationOctetStream,
        ContentType::ApplicationJson,
        ContentType::ApplicationFormUrlEncoded,
        ContentType::MultipartFormData,
        ContentType::TextHtml,
        ContentType::TextJavascript,
        ContentType::TextCss,
        ContentType::ImageWebp,
        ContentType::ImagePng,
        ContentType::ImagePngBase64,
        ContentType::ImageIco,
        ContentType::FontOpenType,
        ContentType::FontTrueType,
    ];

    /// Look up a known content type (ASCII case-insensitive)
    pub fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownContentType(s.to_string()))
    }

    /// MIME string
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::NoneType => "",
            ContentType::All => "*/*",
            ContentType::ApplicationOctetStream => "application/octet-stream",
            ContentType::ApplicationJson => "application/json",
            ContentType::ApplicationFormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::MultipartFormData => "multipart/form-data",
            ContentType::TextHtml => "text/html",
            ContentType::TextJavascript => "text/javascript",
            ContentType::TextCss => "text/css",
            ContentType::ImageWebp => "image/webp",
            ContentType::ImagePng => "image/png",
            ContentType::ImagePngBase64 => "image/png;base64",
            ContentType::ImageIco => "image/ico",
            ContentType::FontOpenType => "application/x-font-opentype",
            ContentType::FontTrueType => "application/x-font-truetype",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    pub const SWITCHING_PROTOCOLS: Status = Status { code: 101 };
    pub const OK: Status = Status { code: 200 };
    pub const FOUND: Status = Status { code: 302 };
    pub const BAD_REQUEST: Status = Status { code: 400 };

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            101 => "Switching Protocols",
            200 => "OK",
            302 => "Found",
            400 => "Bad Request",
            _ => "Unknown",
        }
    }

    /// `HTTP/1.1 <code> <reason>` followed by CRLF
    pub fn status_line(&self) -> String {
        format!("HTTP/1.1 {}{}", self, CRLF)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// Decode `a=1&b=two` into a map, later duplicates winning
fn parse_form(input: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

/// An inbound request, as seen by a handler
#[derive(Debug, Clone)]
pub struct Request {
    verb: Method,
    path: String,
    headers: Headers,
    body: Vec<u8>,
    content_type: ContentType,
    cookie: Option<String>,
    params: HashMap<String, String>,
    raw_query: Option<String>,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    json: Option<serde_json::Value>,
}

impl Request {
    /// Create a builder for constructing requests
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Verb used
    pub fn verb(&self) -> Method {
        self.verb
    }

    /// Path without the query string
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Headers other than the ones parsed into dedicated fields
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Raw body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Declared content type of the body
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Raw `Cookie` header
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// Path parameters, one per placeholder of the matched route
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Query string as received, without the `?`
    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Decoded query parameters
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Decoded `application/x-www-form-urlencoded` body
    pub fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// Parsed body of an `application/json` request
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json.as_ref()
    }

    /// Look a parameter up in path, query and form parameters, in that order
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .or_else(|| self.query.get(name))
            .or_else(|| self.form.get(name))
            .map(String::as_str)
    }
}

/// Builder for requests
#[derive(Debug, Default)]
pub struct RequestBuilder {
    verb: Option<Method>,
    path: Option<String>,
    headers: Headers,
    body: Vec<u8>,
    content_type: ContentType,
    cookie: Option<String>,
    params: HashMap<String, String>,
    raw_query: Option<String>,
}

impl RequestBuilder {
    /// Set the verb
    pub fn verb(mut self, verb: Method) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Set the path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace all headers
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the content type
    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Set the cookie
    pub fn cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    /// Set the path parameters
    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Set the raw query string
    pub fn query(mut self, raw_query: Option<String>) -> Self {
        self.raw_query = raw_query;
        self
    }

    /// Build the request, decoding query, form and JSON views
    pub fn build(self) -> Request {
        let query = self
            .raw_query
            .as_deref()
            .map(|q| parse_form(q.as_bytes()))
            .unwrap_or_default();

        let form = match self.content_type {
            ContentType::ApplicationFormUrlEncoded => parse_form(&self.body),
            _ => HashMap::new(),
        };

        let json = match self.content_type {
            ContentType::ApplicationJson if !self.body.is_empty() => {
                match serde_json::from_slice(&self.body) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        warn!(error = %err, "request body is not valid JSON");
                        None
                    }
                }
            }
            _ => None,
        };

        Request {
            verb: self.verb.unwrap_or(Method::Get),
            path: self.path.unwrap_or_else(|| "/".to_string()),
            headers: self.headers,
            body: self.body,
            content_type: self.content_type,
            cookie: self.cookie,
            params: self.params,
            raw_query: self.raw_query,
            query,
            form,
            json,
        }
    }
}

/// What an HTTP handler returns
///
/// A message with a body becomes `200 OK` (or `302 Found` when a redirect
/// target is set); a message without one becomes `400 Bad Request`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpMessage {
    body: Option<Vec<u8>>,
    cookie: Option<String>,
    redirect: Option<String>,
    keep_alive: bool,
}

impl HttpMessage {
    /// Message with a body
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        HttpMessage {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Message without a body, answered with `400 Bad Request`
    pub fn empty() -> Self {
        HttpMessage::default()
    }

    /// Message whose body is `value` serialized as JSON
    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(serde_json::to_vec(value)?))
    }

    /// Set a cookie with `Set-Cookie`
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Redirect to `location` with `302 Found`
    pub fn with_redirect(mut self, location: impl Into<String>) -> Self {
        self.redirect = Some(location.into());
        self
    }

    /// Advertise `Connection: Keep-Alive` instead of `Connection: close`
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Get the body
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the cookie
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// Get the redirect target
    pub fn redirect(&self) -> Option<&str> {
        self.redirect.as_deref()
    }

    /// Status this message is answered with
    pub fn status(&self) -> Status {
        match (&self.body, &self.redirect) {
            (None, _) => Status::BAD_REQUEST,
            (Some(_), Some(_)) => Status::FOUND,
            (Some(_), None) => Status::OK,
        }
    }

    /// Convert the message to wire format
    pub fn to_wire(&self, content_type: ContentType, server_name: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        let status = self.status();

        buf.extend_from_slice(status.status_line().as_bytes());

        let Some(body) = &self.body else {
            push_header(&mut buf, "Server", server_name);
            push_header(&mut buf, "Connection", "close");
            buf.extend_from_slice(CRLF.as_bytes());
            return buf;
        };

        if let Some(location) = &self.redirect {
            push_header(&mut buf, "Location", location);
        }
        if let Some(cookie) = &self.cookie {
            push_header(&mut buf, "Set-Cookie", cookie);
        }

        push_header(&mut buf, "Server", server_name);
        push_header(&mut buf, "Content-Type", content_type.as_str());
        push_header(&mut buf, "Content-Length", &body.len().to_string());
        push_header(
            &mut buf,
            "Connection",
            if self.keep_alive { "Keep-Alive" } else { "close" },
        );

        // Body sits between two blank lines
        buf.extend_from_slice(CRLF.as_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(CRLF.as_bytes());

        buf
    }
}

fn push_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(CRLF.as_bytes());
}
