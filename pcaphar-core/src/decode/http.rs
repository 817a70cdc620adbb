//! HTTP/1.x decoder using httparse for message heads.
//!
//! Handles messages split across arbitrary reads. It supports:
//! - HTTP/1.0 and HTTP/1.1 requests and responses on either side
//! - Chunked transfer encoding (de-chunked, extensions and trailers ignored)
//! - Content-Length based bodies
//! - Close-delimited response bodies
//! - Keep-alive connections with multiple messages per stream

use std::ops::Range;

use bytes::Bytes;
use compact_str::{format_compact, CompactString};
use httparse::{Status, EMPTY_HEADER};

use super::{
    DecodeContext, DecodeResult, DecodedMessage, Headers, Message, MessageKind, ProtocolDecoder,
    Request, Response,
};
use crate::error::DecodeError;

/// Maximum number of headers to parse per message.
const MAX_HEADERS: usize = 128;

const PROTOCOL: &str = "http";

/// Prefixes a request line or status line can start with.
const START_TOKENS: [&[u8]; 10] = [
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"HEAD ",
    b"OPTIONS ",
    b"PATCH ",
    b"CONNECT ",
    b"TRACE ",
    b"HTTP/1.",
];

enum Head {
    Complete { message: Message, header_len: usize },
    Partial,
    Invalid(String),
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

/// Where a chunked body stands. Chunk data positions go to the caller's span list.
enum Chunked {
    Complete { consumed: usize },
    /// `minimum` is the length of `data` worth scanning again at.
    Partial { minimum: Option<usize> },
    /// Framing broke at this offset.
    Malformed { at: usize },
}

/// HTTP/1.x decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDecoder;

impl HttpDecoder {
    pub fn new() -> Self {
        Self
    }

    fn parse_request(data: &[u8]) -> Result<Option<(Message, usize)>, httparse::Error> {
        let mut headers = [EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        match req.parse(data)? {
            Status::Complete(header_len) => {
                let request = Request {
                    method: CompactString::from(req.method.unwrap_or_default()),
                    target: req.path.unwrap_or_default().to_string(),
                    version: http_version(req.version),
                    headers: Headers::from_httparse(req.headers),
                };
                Ok(Some((Message::Request(request), header_len)))
            }
            Status::Partial => Ok(None),
        }
    }

    fn parse_response(data: &[u8]) -> Result<Option<(Message, usize)>, httparse::Error> {
        let mut headers = [EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut headers);

        match resp.parse(data)? {
            Status::Complete(header_len) => {
                let response = Response {
                    version: http_version(resp.version),
                    status: resp.code.unwrap_or_default(),
                    reason: resp.reason.unwrap_or_default().to_string(),
                    headers: Headers::from_httparse(resp.headers),
                };
                Ok(Some((Message::Response(response), header_len)))
            }
            Status::Partial => Ok(None),
        }
    }

    /// Parse a message head, trying `prefer` first and the other kind second.
    fn parse_head(data: &[u8], prefer: MessageKind) -> Head {
        let parse = |kind: MessageKind| match kind {
            MessageKind::Request => Self::parse_request(data),
            MessageKind::Response => Self::parse_response(data),
        };

        let head = |(message, header_len): (Message, usize)| Head::Complete {
            message,
            header_len,
        };

        match parse(prefer) {
            Ok(Some(parsed)) => head(parsed),
            Ok(None) => match parse(prefer.other()) {
                Ok(Some(parsed)) => head(parsed),
                _ => Head::Partial,
            },
            Err(e) => match parse(prefer.other()) {
                Ok(Some(parsed)) => head(parsed),
                Ok(None) => Head::Partial,
                Err(_) => Head::Invalid(e.to_string()),
            },
        }
    }

    fn framing(message: &Message) -> Result<Framing, String> {
        let headers = match message {
            Message::Request(request) => &request.headers,
            Message::Response(response) => {
                let status = response.status;
                if (100..200).contains(&status) || status == 204 || status == 304 {
                    return Ok(Framing::Empty);
                }
                &response.headers
            }
        };

        let chunked = headers
            .get_all("transfer-encoding")
            .any(|v| v.to_ascii_lowercase().contains("chunked"));
        if chunked {
            return Ok(Framing::Chunked);
        }

        if let Some(value) = headers.get("content-length") {
            return value
                .trim()
                .parse::<usize>()
                .map(Framing::Length)
                .map_err(|_| format!("invalid Content-Length {value:?}"));
        }

        Ok(match message {
            Message::Request(_) => Framing::Empty,
            Message::Response(_) => Framing::UntilClose,
        })
    }

    /// Walk the framing of a chunked body without copying it.
    fn scan_chunked(data: &[u8], spans: &mut Vec<Range<usize>>) -> Chunked {
        let mut pos = 0;

        loop {
            let Some(line_end) = find(&data[pos..], b"\r\n").map(|p| pos + p) else {
                return Chunked::Partial { minimum: None };
            };

            let Ok(size_str) = std::str::from_utf8(&data[pos..line_end]) else {
                return Chunked::Malformed { at: pos };
            };
            // Chunk extensions follow a semicolon
            let size_part = size_str.split(';').next().unwrap_or(size_str);
            let Ok(chunk_size) = usize::from_str_radix(size_part.trim(), 16) else {
                return Chunked::Malformed { at: pos };
            };

            let start = line_end + 2;

            if chunk_size == 0 {
                if data.len() >= start + 2 && &data[start..start + 2] == b"\r\n" {
                    return Chunked::Complete {
                        consumed: start + 2,
                    };
                }
                // Trailers
                return match find(&data[start..], b"\r\n\r\n") {
                    Some(end) => Chunked::Complete {
                        consumed: start + end + 4,
                    },
                    None => Chunked::Partial { minimum: None },
                };
            }

            let Some(chunk_end) = start.checked_add(chunk_size) else {
                return Chunked::Malformed { at: pos };
            };
            if data.len() < chunk_end + 2 {
                spans.push(start..chunk_end.min(data.len()));
                return Chunked::Partial {
                    minimum: chunk_end.checked_add(2),
                };
            }
            spans.push(start..chunk_end);
            if &data[chunk_end..chunk_end + 2] != b"\r\n" {
                return Chunked::Malformed { at: chunk_end };
            }

            pos = chunk_end + 2;
        }
    }

    fn decode_at(&self, data: &[u8], ctx: &DecodeContext, at_eof: bool) -> DecodeResult {
        if data.is_empty() {
            return DecodeResult::NeedMore {
                minimum_bytes: None,
            };
        }

        let (message, header_len) = match Self::parse_head(data, ctx.preferred()) {
            Head::Complete {
                message,
                header_len,
            } => (message, header_len),
            Head::Partial if at_eof => {
                return DecodeResult::Error {
                    error: DecodeError::Truncated {
                        protocol: PROTOCOL,
                        have: data.len(),
                    },
                    skip_bytes: None,
                };
            }
            Head::Partial => {
                return DecodeResult::NeedMore {
                    minimum_bytes: None,
                };
            }
            Head::Invalid(reason) => {
                let skip_bytes = message_start(data, false, at_eof);
                // A resync point may still arrive
                if skip_bytes.is_none() && !at_eof {
                    return DecodeResult::NeedMore {
                        minimum_bytes: None,
                    };
                }
                return DecodeResult::Error {
                    error: malformed(format!("invalid message head: {reason}")),
                    skip_bytes,
                };
            }
        };

        // Interim responses precede the real one; 101 ends HTTP on the stream.
        if let Message::Response(response) = &message {
            if (100..200).contains(&response.status) && response.status != 101 {
                return DecodeResult::Skip {
                    bytes_consumed: header_len,
                };
            }
        }

        let rest = &data[header_len..];
        let framing = match Self::framing(&message) {
            Ok(framing) => framing,
            // Body extent unknown: keep the head and take bytes up to the next message
            Err(reason) => {
                return match body_end(rest, 0, at_eof) {
                    Some(end) => damaged(
                        message,
                        Bytes::copy_from_slice(&rest[..end]),
                        header_len + end,
                        reason,
                    ),
                    None => DecodeResult::NeedMore {
                        minimum_bytes: None,
                    },
                };
            }
        };

        match framing {
            Framing::Empty => complete(message, Bytes::new(), header_len, false),
            Framing::Length(len) if rest.len() >= len => complete(
                message,
                Bytes::copy_from_slice(&rest[..len]),
                header_len + len,
                false,
            ),
            Framing::Length(_) if at_eof => {
                complete(message, Bytes::copy_from_slice(rest), data.len(), true)
            }
            Framing::Length(len) => DecodeResult::NeedMore {
                minimum_bytes: header_len.checked_add(len),
            },
            Framing::Chunked => {
                let mut spans = Vec::new();
                match Self::scan_chunked(rest, &mut spans) {
                    Chunked::Complete { consumed } => {
                        complete(message, gather(rest, &spans), header_len + consumed, false)
                    }
                    Chunked::Partial { .. } if at_eof => {
                        complete(message, gather(rest, &spans), data.len(), true)
                    }
                    Chunked::Partial { minimum } => DecodeResult::NeedMore {
                        minimum_bytes: minimum.and_then(|m| m.checked_add(header_len)),
                    },
                    Chunked::Malformed { at } => match body_end(rest, at, at_eof) {
                        Some(end) => damaged(
                            message,
                            gather(rest, &spans),
                            header_len + end,
                            "malformed chunked body".to_string(),
                        ),
                        None => DecodeResult::NeedMore {
                            minimum_bytes: None,
                        },
                    },
                }
            }
            Framing::UntilClose if at_eof => {
                complete(message, Bytes::copy_from_slice(rest), data.len(), false)
            }
            Framing::UntilClose => DecodeResult::NeedMore {
                minimum_bytes: None,
            },
        }
    }
}

impl ProtocolDecoder for HttpDecoder {
    fn name(&self) -> &'static str {
        PROTOCOL
    }

    fn display_name(&self) -> &'static str {
        "HTTP"
    }

    fn sniff(&self, data: &[u8]) -> bool {
        !data.is_empty() && could_start(data)
    }

    fn classify(&self, data: &[u8]) -> Option<MessageKind> {
        if data.starts_with(b"HTTP/") {
            Some(MessageKind::Response)
        } else if !data.is_empty() && could_start(data) {
            Some(MessageKind::Request)
        } else {
            None
        }
    }

    fn decode(&self, data: &[u8], ctx: &DecodeContext) -> DecodeResult {
        self.decode_at(data, ctx, false)
    }

    fn finish(&self, data: &[u8], ctx: &DecodeContext) -> DecodeResult {
        self.decode_at(data, ctx, true)
    }
}

fn complete(message: Message, body: Bytes, consumed: usize, truncated: bool) -> DecodeResult {
    let mut decoded = DecodedMessage::new(message, body);
    decoded.truncated = truncated;
    DecodeResult::Complete {
        message: decoded,
        bytes_consumed: consumed,
    }
}

/// A message whose head parsed but whose body framing is broken.
fn damaged(message: Message, body: Bytes, consumed: usize, reason: String) -> DecodeResult {
    let decoded = DecodedMessage::new(message, body).with_error(Some(malformed(reason)));
    DecodeResult::Complete {
        message: decoded,
        bytes_consumed: consumed,
    }
}

/// Concatenate chunk data in one copy.
fn gather(data: &[u8], spans: &[Range<usize>]) -> Bytes {
    let mut body = Vec::with_capacity(spans.iter().map(|span| span.len()).sum());
    for span in spans {
        body.extend_from_slice(&data[span.clone()]);
    }
    Bytes::from(body)
}

fn malformed(reason: String) -> DecodeError {
    DecodeError::Malformed {
        protocol: PROTOCOL,
        reason,
    }
}

fn http_version(minor: Option<u8>) -> CompactString {
    match minor {
        Some(0) => CompactString::from("HTTP/1.0"),
        Some(v) if v != 1 => format_compact!("HTTP/1.{v}"),
        _ => CompactString::from("HTTP/1.1"),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Whether `data` starts with, or is a prefix of, a request or status line.
fn could_start(data: &[u8]) -> bool {
    START_TOKENS.iter().any(|token| {
        if data.len() >= token.len() {
            data.starts_with(token)
        } else {
            token.starts_with(data)
        }
    })
}

/// Whether `data` starts with a full request or status line prefix.
fn starts_message(data: &[u8]) -> bool {
    START_TOKENS.iter().any(|token| data.starts_with(token))
}

/// Offset of the next line that begins a message, optionally counting
/// offset 0.
///
/// Only the first candidate can be cut short by the end of `data`; it
/// counts at end of stream and otherwise waits for more bytes, so the
/// answer does not depend on how the stream was split into reads.
fn message_start(data: &[u8], from_start: bool, at_eof: bool) -> Option<usize> {
    let line_starts = data
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .map(|(i, _)| i + 1);
    let start = from_start
        .then_some(0)
        .into_iter()
        .chain(line_starts)
        .find(|&start| start < data.len() && could_start(&data[start..]))?;
    (at_eof || starts_message(&data[start..])).then_some(start)
}

/// End of a body whose framing broke at `from`: the next message start,
/// or everything at end of stream.
fn body_end(rest: &[u8], from: usize, at_eof: bool) -> Option<usize> {
    match message_start(&rest[from..], true, at_eof) {
        Some(start) => Some(from + start),
        None if at_eof => Some(rest.len()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Side;

    fn client() -> DecodeContext {
        DecodeContext::new(Side::Client)
    }

    fn server() -> DecodeContext {
        DecodeContext::new(Side::Server)
    }

    fn expect_complete(result: DecodeResult) -> (DecodedMessage, usize) {
        match result {
            DecodeResult::Complete {
                message,
                bytes_consumed,
            } => (message, bytes_consumed),
            other => panic!("Expected Complete, got {other:?}"),
        }
    }

    fn expect_request(message: &DecodedMessage) -> &Request {
        match &message.message {
            Message::Request(request) => request,
            other => panic!("Expected request, got {other:?}"),
        }
    }

    fn expect_response(message: &DecodedMessage) -> &Response {
        match &message.message {
            Message::Response(response) => response,
            other => panic!("Expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_request_without_body() {
        let decoder = HttpDecoder::new();
        let data = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\nGET /next";

        let (message, consumed) = expect_complete(decoder.decode(data, &client()));
        let request = expect_request(&message);
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/index.html");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.host(), Some("example.com"));
        assert!(message.body.is_empty());
        assert_eq!(&data[consumed..], b"GET /next");
    }

    #[test]
    fn test_response_with_content_length() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n{}HTTP/1.1 200 OK\r\n";

        let (message, consumed) = expect_complete(decoder.decode(data, &server()));
        let response = expect_response(&message);
        assert_eq!(response.status, 200);
        assert_eq!(response.reason, "OK");
        assert_eq!(&message.body[..], b"{}");
        assert!(data[consumed..].starts_with(b"HTTP/1.1"));
    }

    #[test]
    fn test_request_body_with_content_length() {
        let decoder = HttpDecoder::new();
        let data = b"POST /submit HTTP/1.0\r\nContent-Length: 5\r\n\r\nhello";

        let (message, consumed) = expect_complete(decoder.decode(data, &client()));
        assert_eq!(expect_request(&message).version, "HTTP/1.0");
        assert_eq!(&message.body[..], b"hello");
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_partial_head_needs_more() {
        let decoder = HttpDecoder::new();
        let result = decoder.decode(b"GET / HTTP/1.1\r\nHost: exa", &client());
        assert!(matches!(result, DecodeResult::NeedMore { .. }));
    }

    #[test]
    fn test_partial_body_needs_more() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n12345";

        match decoder.decode(data, &server()) {
            DecodeResult::NeedMore { minimum_bytes } => {
                assert_eq!(minimum_bytes, Some(data.len() + 5));
            }
            other => panic!("Expected NeedMore, got {other:?}"),
        }
    }

    #[test]
    fn test_chunked_body_is_dechunked() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                     5;ext=1\r\nhello\r\n6\r\n world\r\n0\r\nX-Trailer: yes\r\n\r\nNEXT";

        let (message, consumed) = expect_complete(decoder.decode(data, &server()));
        assert_eq!(&message.body[..], b"hello world");
        assert_eq!(&data[consumed..], b"NEXT");
    }

    #[test]
    fn test_chunked_body_waits_for_terminator() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n";
        assert!(matches!(
            decoder.decode(data, &server()),
            DecodeResult::NeedMore { .. }
        ));

        // Truncated capture: surface what was collected
        let (message, consumed) = expect_complete(decoder.finish(data, &server()));
        assert_eq!(&message.body[..], b"hello");
        assert!(message.truncated);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_malformed_chunk_size() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
                     2\r\nok\r\nzz\r\nhello\r\nHTTP/1.1 204 No Content\r\n\r\n";

        let (message, consumed) = expect_complete(decoder.decode(data, &server()));
        assert_eq!(expect_response(&message).status, 200);
        assert_eq!(&message.body[..], b"ok");
        assert!(message.error.as_ref().unwrap().to_string().contains("chunked"));
        assert_eq!(&data[consumed..], b"HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[test]
    fn test_malformed_chunk_size_waits_for_next_message() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nhello\r\nHTT";

        // The trailing bytes may still grow into a status line
        assert!(matches!(
            decoder.decode(data, &server()),
            DecodeResult::NeedMore { .. }
        ));
        let (message, consumed) = expect_complete(decoder.finish(data, &server()));
        assert!(message.error.is_some());
        assert_eq!(&data[consumed..], b"HTT");
    }

    #[test]
    fn test_chunked_needs_more_reports_chunk_end() {
        let decoder = HttpDecoder::new();
        let head = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".len();
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\na\r\n01";

        match decoder.decode(data, &server()) {
            DecodeResult::NeedMore { minimum_bytes } => {
                // Second chunk's data starts 11 bytes in, ten bytes and a CRLF follow
                assert_eq!(minimum_bytes, Some(head + 11 + 10 + 2));
            }
            other => panic!("Expected NeedMore, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_body_surfaced_at_eof() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n--";

        let (message, consumed) = expect_complete(decoder.finish(data, &server()));
        assert_eq!(expect_response(&message).status, 200);
        assert_eq!(&message.body[..], b"--");
        assert!(message.truncated);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_close_delimited_body() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nuntil close";

        assert!(matches!(
            decoder.decode(data, &server()),
            DecodeResult::NeedMore { .. }
        ));

        let (message, consumed) = expect_complete(decoder.finish(data, &server()));
        assert_eq!(&message.body[..], b"until close");
        assert!(!message.truncated);
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_incomplete_head_at_eof_is_error() {
        let decoder = HttpDecoder::new();
        match decoder.finish(b"HTTP/1.1 200 OK\r\nContent-", &server()) {
            DecodeResult::Error { error, skip_bytes } => {
                assert!(matches!(error, DecodeError::Truncated { .. }));
                assert!(skip_bytes.is_none());
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_no_body_statuses() {
        let decoder = HttpDecoder::new();
        for status in ["204 No Content", "304 Not Modified"] {
            let data = format!("HTTP/1.1 {status}\r\nContent-Length: 10\r\n\r\n");
            let (message, consumed) = expect_complete(decoder.decode(data.as_bytes(), &server()));
            assert!(message.body.is_empty());
            assert_eq!(consumed, data.len());
        }
    }

    #[test]
    fn test_interim_response_skipped() {
        let decoder = HttpDecoder::new();
        let data = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";

        match decoder.decode(data, &server()) {
            DecodeResult::Skip { bytes_consumed } => {
                assert_eq!(bytes_consumed, b"HTTP/1.1 100 Continue\r\n\r\n".len());
            }
            other => panic!("Expected Skip, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_head_resyncs_to_next_message() {
        let decoder = HttpDecoder::new();
        let data = b"garbage line here\r\nGET /ok HTTP/1.1\r\n\r\n";

        match decoder.decode(data, &client()) {
            DecodeResult::Error { error, skip_bytes } => {
                assert!(error.to_string().starts_with("http:"));
                let skip = skip_bytes.unwrap();
                assert_eq!(&data[skip..], b"GET /ok HTTP/1.1\r\n\r\n");
            }
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_head_without_resync_point() {
        let decoder = HttpDecoder::new();
        let data = b"\x00\x01\x02 binary junk";
        assert!(matches!(
            decoder.decode(data, &client()),
            DecodeResult::NeedMore { .. }
        ));
        match decoder.finish(data, &client()) {
            DecodeResult::Error { skip_bytes, .. } => assert!(skip_bytes.is_none()),
            other => panic!("Expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_content_length_keeps_head() {
        let decoder = HttpDecoder::new();
        let data = b"POST /form HTTP/1.1\r\nContent-Length: lots\r\n\r\n\
                     a=1\r\nGET /next HTTP/1.1\r\n\r\n";

        let (message, consumed) = expect_complete(decoder.decode(data, &client()));
        assert_eq!(expect_request(&message).target, "/form");
        assert_eq!(&message.body[..], b"a=1\r\n");
        assert!(message.error.unwrap().to_string().contains("Content-Length"));
        assert_eq!(&data[consumed..], b"GET /next HTTP/1.1\r\n\r\n");

        // Nothing follows until end of stream
        let data = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        assert!(matches!(
            decoder.decode(data, &client()),
            DecodeResult::NeedMore { .. }
        ));
        let (message, consumed) = expect_complete(decoder.finish(data, &client()));
        assert!(message.error.is_some());
        assert_eq!(consumed, data.len());
    }

    #[test]
    fn test_request_found_on_server_side() {
        let decoder = HttpDecoder::new();
        let (message, _) = expect_complete(decoder.decode(b"GET / HTTP/1.1\r\n\r\n", &server()));
        assert_eq!(message.message.kind(), MessageKind::Request);
    }

    #[test]
    fn test_sniff() {
        let decoder = HttpDecoder::new();
        assert!(decoder.sniff(b"GET / HTTP/1.1\r\n"));
        assert!(decoder.sniff(b"HTTP/1.1 200 OK"));
        assert!(decoder.sniff(b"PO"));
        assert!(!decoder.sniff(b"\x01\x01\x00\x01\x00\x08\x00\x00"));
        assert!(!decoder.sniff(b""));
    }

    #[test]
    fn test_classify() {
        let decoder = HttpDecoder::new();
        assert_eq!(decoder.classify(b"HTTP/1.1 200 OK"), Some(MessageKind::Response));
        assert_eq!(decoder.classify(b"DELETE /x"), Some(MessageKind::Request));
        assert_eq!(decoder.classify(b"\x16\x03\x01"), None);
    }
}
