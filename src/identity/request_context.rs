//! Transport-tagged view of an inbound request or WebSocket handshake.
//! Exposes the common headers/cookies/query surface; the resolver branches on
//! the transport kind only for failure policy, never on object shape.
//! Every parse here returns an Option and swallows malformed input; a broken
//! header must not abort resolution, only fall through to the next source.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    WebSocket,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    transport: Transport,
    /// Header names lowercased on insert.
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
    client_addr: Option<String>,
}

fn parse_cookie_header(raw: &str, into: &mut HashMap<String, String>) {
    for part in raw.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if !k.is_empty() {
                into.insert(k.to_string(), v[1..].to_string());
            }
        }
    }
}

fn parse_query_string(raw: &str, into: &mut HashMap<String, String>) {
    for pair in raw.trim_start_matches('?').split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let k = match urlencoding::decode(k) {
            Ok(k) => k.into_owned(),
            Err(_) => continue,
        };
        let v = urlencoding::decode(v).map(|v| v.into_owned()).unwrap_or_default();
        if !k.is_empty() {
            into.insert(k, v);
        }
    }
}

impl RequestContext {
    pub fn http() -> Self { Self::new(Transport::Http) }

    pub fn websocket() -> Self { Self::new(Transport::WebSocket) }

    fn new(transport: Transport) -> Self {
        RequestContext {
            transport,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            query: HashMap::new(),
            client_addr: None,
        }
    }

    /// Record a header. A `Cookie` header is additionally parsed into the
    /// cookie map, which is what lets WebSocket clients that can only set raw
    /// handshake headers still present cookies.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            parse_cookie_header(value, &mut self.cookies);
        }
        self.headers.insert(name, value.to_string());
        self
    }

    pub fn with_query_string(mut self, raw: &str) -> Self {
        parse_query_string(raw, &mut self.query);
        self
    }

    pub fn with_client_addr(mut self, addr: impl Into<String>) -> Self {
        self.client_addr = Some(addr.into());
        self
    }

    pub fn transport(&self) -> Transport { self.transport }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|s| s.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(|s| s.as_str())
    }

    pub fn client_addr(&self) -> Option<&str> { self.client_addr.as_deref() }
}
