//! Decoded HTTP-shaped messages.

use bytes::Bytes;
use compact_str::CompactString;

use crate::error::DecodeError;
use crate::flow::Side;

/// Header list in wire order with case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(CompactString, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<CompactString>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// First value of the named header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of the named header, in wire order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn from_httparse(headers: &[httparse::Header<'_>]) -> Self {
        let mut out = Self::new();
        for header in headers.iter().filter(|h| !h.name.is_empty()) {
            out.push(header.name, String::from_utf8_lossy(header.value).into_owned());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: CompactString,
    /// Request target as sent (origin-form or absolute-form).
    pub target: String,
    pub version: CompactString,
    pub headers: Headers,
}

impl Request {
    pub fn host(&self) -> Option<&str> {
        self.headers.get("host")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: CompactString,
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
}

impl Response {
    pub fn location(&self) -> Option<&str> {
        self.headers.get("location")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

impl MessageKind {
    /// The kind a stream from `side` normally carries.
    pub fn expected_on(side: Side) -> Self {
        match side {
            Side::Client => MessageKind::Request,
            Side::Server => MessageKind::Response,
        }
    }

    pub fn other(self) -> Self {
        match self {
            MessageKind::Request => MessageKind::Response,
            MessageKind::Response => MessageKind::Request,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Request(_) => MessageKind::Request,
            Message::Response(_) => MessageKind::Response,
        }
    }
}

/// One message produced by a decoder, with its fully buffered body.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    pub message: Message,
    pub body: Bytes,
    /// Application exit status reported alongside a response (FastCGI).
    pub exit_status: Option<u32>,
    /// Stream ended before the declared body was complete.
    pub truncated: bool,
    /// Problem found after the message head was recognized. The message
    /// still takes its position in the pairing.
    pub error: Option<DecodeError>,
}

impl DecodedMessage {
    pub fn new(message: Message, body: Bytes) -> Self {
        Self {
            message,
            body,
            exit_status: None,
            truncated: false,
            error: None,
        }
    }

    pub fn with_error(mut self, error: Option<DecodeError>) -> Self {
        self.error = error;
        self
    }
}
