//! FastCGI decoder.
//!
//! A FastCGI connection carries records, each with an 8-byte header:
//!
//! ```text
//! version(1) type(1) request_id(2) content_length(2) padding_length(1) reserved(1)
//! ```
//!
//! The web server side sends `BEGIN_REQUEST`, a `PARAMS` stream holding the
//! CGI environment and a `STDIN` stream holding the request body; both
//! streams end with an empty record. The application side answers with a
//! `STDOUT` stream (a CGI response: header lines, blank line, body),
//! optional `STDERR` and a final `END_REQUEST` carrying the exit status.
//!
//! Records of one request are assumed not to interleave with another's.

use bytes::Bytes;
use compact_str::CompactString;
use httparse::{Status, EMPTY_HEADER};
use tracing::{debug, trace};

use super::{
    DecodeContext, DecodeResult, DecodedMessage, Headers, Message, MessageKind, ProtocolDecoder,
    Request, Response,
};
use crate::error::DecodeError;

const FCGI_VERSION_1: u8 = 1;
const HEADER_LEN: usize = 8;
const MAX_HEADERS: usize = 128;
const PROTOCOL: &str = "fastcgi";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum RecordType {
    BeginRequest = 1,
    AbortRequest = 2,
    EndRequest = 3,
    Params = 4,
    Stdin = 5,
    Stdout = 6,
    Stderr = 7,
    Data = 8,
    GetValues = 9,
    GetValuesResult = 10,
    UnknownType = 11,
}

impl RecordType {
    fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => RecordType::BeginRequest,
            2 => RecordType::AbortRequest,
            3 => RecordType::EndRequest,
            4 => RecordType::Params,
            5 => RecordType::Stdin,
            6 => RecordType::Stdout,
            7 => RecordType::Stderr,
            8 => RecordType::Data,
            9 => RecordType::GetValues,
            10 => RecordType::GetValuesResult,
            11 => RecordType::UnknownType,
            _ => return None,
        })
    }
}

struct Record<'a> {
    kind: RecordType,
    request_id: u16,
    content: &'a [u8],
    /// Header, content and padding.
    len: usize,
}

enum RecordParse<'a> {
    Record(Record<'a>),
    NeedMore(usize),
    BadVersion(u8),
    UnknownType { kind: u8, len: usize },
}

fn parse_record(data: &[u8]) -> RecordParse<'_> {
    match data.first() {
        Some(&FCGI_VERSION_1) => {}
        Some(&version) => return RecordParse::BadVersion(version),
        None => return RecordParse::NeedMore(HEADER_LEN),
    }
    if data.len() < HEADER_LEN {
        return RecordParse::NeedMore(HEADER_LEN);
    }

    let content_len = u16::from_be_bytes([data[4], data[5]]) as usize;
    let len = HEADER_LEN + content_len + data[6] as usize;

    let Some(kind) = RecordType::from_u8(data[1]) else {
        return RecordParse::UnknownType { kind: data[1], len };
    };
    if data.len() < len {
        return RecordParse::NeedMore(len);
    }

    RecordParse::Record(Record {
        kind,
        request_id: u16::from_be_bytes([data[2], data[3]]),
        content: &data[HEADER_LEN..HEADER_LEN + content_len],
        len,
    })
}

/// Records of one request or response collected so far, borrowed from the
/// stream buffer until the message is built.
#[derive(Default)]
struct Transaction<'a> {
    request_id: Option<u16>,
    params: Vec<&'a [u8]>,
    params_done: bool,
    stdin: Vec<&'a [u8]>,
    stdout: Vec<&'a [u8]>,
    stderr_len: usize,
    /// Damage stepped over while collecting.
    problems: Vec<String>,
}

impl Transaction<'_> {
    fn is_empty(&self) -> bool {
        self.request_id.is_none()
            && self.params.is_empty()
            && self.stdin.is_empty()
            && self.stdout.is_empty()
            && self.stderr_len == 0
    }

    fn request(mut self, consumed: usize, truncated: bool) -> DecodeResult {
        let (params, problem) = decode_params(&self.params.concat());
        self.problems.extend(problem);

        let mut message = DecodedMessage::new(
            Message::Request(cgi_request(&params)),
            Bytes::from(self.stdin.concat()),
        );
        message.truncated = truncated;
        self.complete(message, consumed)
    }

    fn response(
        mut self,
        consumed: usize,
        exit_status: Option<u32>,
        truncated: bool,
    ) -> DecodeResult {
        if self.stderr_len > 0 {
            trace!(
                "Dropping {} bytes of stderr for request {:?}",
                self.stderr_len,
                self.request_id
            );
        }

        let (response, body, problem) = cgi_response(self.stdout.concat());
        self.problems.extend(problem);

        let mut message = DecodedMessage::new(Message::Response(response), body);
        message.exit_status = exit_status;
        message.truncated = truncated;
        self.complete(message, consumed)
    }

    fn complete(self, message: DecodedMessage, consumed: usize) -> DecodeResult {
        let error = (!self.problems.is_empty()).then(|| malformed(self.problems.join("; ")));
        DecodeResult::Complete {
            message: message.with_error(error),
            bytes_consumed: consumed,
        }
    }

    /// Surface what was collected before the message was cut short at
    /// `end`. With nothing worth surfacing the result is an error skipping
    /// `skip_bytes`.
    fn cut_short(self, end: usize, skip_bytes: Option<usize>) -> DecodeResult {
        if !self.stdout.is_empty() {
            return self.response(end, None, true);
        }
        if self.params_done {
            return self.request(end, true);
        }
        let error = if self.problems.is_empty() {
            DecodeError::Truncated {
                protocol: PROTOCOL,
                have: end,
            }
        } else {
            malformed(self.problems.join("; "))
        };
        DecodeResult::Error { error, skip_bytes }
    }
}

/// FastCGI record-stream decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct FcgiDecoder;

impl FcgiDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_at(&self, data: &[u8], at_eof: bool) -> DecodeResult {
        let mut tx = Transaction::default();
        let mut pos = 0;

        loop {
            let record = match parse_record(&data[pos..]) {
                RecordParse::Record(record) => record,
                RecordParse::NeedMore(_) if at_eof => return tx.cut_short(data.len(), None),
                RecordParse::NeedMore(len) => {
                    return DecodeResult::NeedMore {
                        minimum_bytes: Some(pos + len),
                    };
                }
                RecordParse::BadVersion(version) => {
                    let problem = format!("unsupported record version {version}");
                    match resync_offset(data, pos + 1, at_eof) {
                        // Step over the damage and keep collecting
                        Some(next) if !tx.is_empty() => {
                            debug!("Skipping {} damaged FastCGI bytes", next - pos);
                            tx.problems.push(problem);
                            pos = next;
                            continue;
                        }
                        Some(next) => {
                            return DecodeResult::Error {
                                error: malformed(problem),
                                skip_bytes: Some(next),
                            };
                        }
                        None if at_eof => {
                            tx.problems.push(problem);
                            return tx.cut_short(data.len(), None);
                        }
                        None => {
                            return DecodeResult::NeedMore {
                                minimum_bytes: None,
                            };
                        }
                    }
                }
                RecordParse::UnknownType { kind, len } => {
                    let problem = format!("unknown record type {kind}");
                    if tx.is_empty() {
                        return DecodeResult::Error {
                            error: malformed(problem),
                            skip_bytes: Some(pos + len),
                        };
                    }
                    if data.len() < pos + len {
                        if at_eof {
                            tx.problems.push(problem);
                            return tx.cut_short(data.len(), None);
                        }
                        return DecodeResult::NeedMore {
                            minimum_bytes: Some(pos + len),
                        };
                    }
                    tx.problems.push(problem);
                    pos += len;
                    continue;
                }
            };

            let start = pos;
            pos += record.len;

            match record.kind {
                RecordType::BeginRequest => {
                    if !tx.is_empty() {
                        tx.problems.push(format!(
                            "request {} incomplete at next BEGIN_REQUEST",
                            tx.request_id.unwrap_or(record.request_id)
                        ));
                        return tx.cut_short(start, Some(start));
                    }
                    tx.request_id = Some(record.request_id);
                }
                RecordType::Params if record.content.is_empty() => tx.params_done = true,
                RecordType::Params => tx.params.push(record.content),
                RecordType::Stdin if record.content.is_empty() => return tx.request(pos, false),
                RecordType::Stdin => tx.stdin.push(record.content),
                RecordType::Data => {}
                RecordType::AbortRequest => {
                    debug!("FastCGI request {} aborted", record.request_id);
                    return DecodeResult::Skip {
                        bytes_consumed: pos,
                    };
                }
                RecordType::Stdout if record.content.is_empty() => {}
                RecordType::Stdout => tx.stdout.push(record.content),
                RecordType::Stderr => tx.stderr_len += record.content.len(),
                RecordType::EndRequest => {
                    let exit_status = record
                        .content
                        .get(..4)
                        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
                    let protocol_status = record.content.get(4).copied().unwrap_or(0);

                    if tx.stdout.is_empty() && protocol_status != 0 {
                        // No output to parse: an empty response still answers the request
                        tx.problems.push(format!(
                            "request {} rejected: {}",
                            record.request_id,
                            protocol_status_name(protocol_status)
                        ));
                        let mut message =
                            DecodedMessage::new(Message::Response(no_response()), Bytes::new());
                        message.exit_status = exit_status;
                        return tx.complete(message, pos);
                    }
                    return tx.response(pos, exit_status, false);
                }
                RecordType::GetValues | RecordType::GetValuesResult | RecordType::UnknownType => {
                    if tx.is_empty() {
                        return DecodeResult::Skip {
                            bytes_consumed: pos,
                        };
                    }
                }
            }
        }
    }
}

impl ProtocolDecoder for FcgiDecoder {
    fn name(&self) -> &'static str {
        PROTOCOL
    }

    fn display_name(&self) -> &'static str {
        "FastCGI"
    }

    fn sniff(&self, data: &[u8]) -> bool {
        plausible_header(data)
    }

    fn classify(&self, data: &[u8]) -> Option<MessageKind> {
        if !plausible_header(data) {
            return None;
        }
        match RecordType::from_u8(*data.get(1)?)? {
            RecordType::BeginRequest | RecordType::Params | RecordType::Stdin => {
                Some(MessageKind::Request)
            }
            RecordType::Stdout | RecordType::Stderr | RecordType::EndRequest => {
                Some(MessageKind::Response)
            }
            _ => None,
        }
    }

    fn decode(&self, data: &[u8], _ctx: &DecodeContext) -> DecodeResult {
        self.decode_at(data, false)
    }

    fn finish(&self, data: &[u8], _ctx: &DecodeContext) -> DecodeResult {
        self.decode_at(data, true)
    }
}

fn malformed(reason: String) -> DecodeError {
    DecodeError::Malformed {
        protocol: PROTOCOL,
        reason,
    }
}

fn protocol_status_name(status: u8) -> &'static str {
    match status {
        1 => "cannot multiplex connection",
        2 => "overloaded",
        3 => "unknown role",
        _ => "unknown protocol status",
    }
}

/// Whether a record header could start at `data[0]`; short input is judged
/// on the bytes present.
fn plausible_header(data: &[u8]) -> bool {
    data.first() == Some(&FCGI_VERSION_1)
        && data
            .get(1)
            .map_or(true, |kind| RecordType::from_u8(*kind).is_some())
        && data.get(7).map_or(true, |reserved| *reserved == 0)
}

/// First offset from `from` where a record header could start.
///
/// A candidate too short to judge in full only counts at end of stream, so
/// the answer does not depend on how the stream was split into reads.
fn resync_offset(data: &[u8], from: usize, at_eof: bool) -> Option<usize> {
    let start = (from..data.len()).find(|&i| plausible_header(&data[i..]))?;
    (at_eof || data.len() - start >= HEADER_LEN).then_some(start)
}

fn read_length(data: &[u8], pos: &mut usize) -> Result<usize, String> {
    let first = *data
        .get(*pos)
        .ok_or_else(|| "truncated name-value length".to_string())?;
    if first & 0x80 == 0 {
        *pos += 1;
        return Ok(first as usize);
    }

    let bytes = data
        .get(*pos..*pos + 4)
        .ok_or_else(|| "truncated name-value length".to_string())?;
    *pos += 4;
    Ok(u32::from_be_bytes([bytes[0] & 0x7f, bytes[1], bytes[2], bytes[3]]) as usize)
}

fn read_pair(data: &[u8], pos: &mut usize) -> Result<(String, String), String> {
    let name_len = read_length(data, pos)?;
    let value_len = read_length(data, pos)?;

    let name = data
        .get(*pos..*pos + name_len)
        .ok_or_else(|| "truncated parameter name".to_string())?;
    *pos += name_len;
    let value = data
        .get(*pos..*pos + value_len)
        .ok_or_else(|| "truncated parameter value".to_string())?;
    *pos += value_len;

    Ok((
        String::from_utf8_lossy(name).into_owned(),
        String::from_utf8_lossy(value).into_owned(),
    ))
}

/// Decode a PARAMS stream into name/value pairs in wire order, stopping at
/// the first damaged pair.
fn decode_params(data: &[u8]) -> (Vec<(String, String)>, Option<String>) {
    let mut params = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        match read_pair(data, &mut pos) {
            Ok(pair) => params.push(pair),
            Err(problem) => return (params, Some(problem)),
        }
    }

    (params, None)
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

/// `HTTP_USER_AGENT` -> `User-Agent`
fn header_name(cgi_name: &str) -> CompactString {
    let mut name = CompactString::default();
    for (i, part) in cgi_name.split('_').enumerate() {
        if i > 0 {
            name.push('-');
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.push(first.to_ascii_uppercase());
            name.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }
    name
}

fn cgi_request(params: &[(String, String)]) -> Request {
    let target = match param(params, "REQUEST_URI") {
        Some(uri) => uri.to_string(),
        None => {
            let mut target = param(params, "SCRIPT_NAME").unwrap_or("/").to_string();
            if let Some(query) = param(params, "QUERY_STRING") {
                target.push('?');
                target.push_str(query);
            }
            target
        }
    };

    let mut headers = Headers::new();
    for (name, value) in params {
        if let Some(suffix) = name.strip_prefix("HTTP_") {
            headers.push(header_name(suffix), value.clone());
        } else if (name == "CONTENT_TYPE" || name == "CONTENT_LENGTH") && !value.is_empty() {
            headers.push(header_name(name), value.clone());
        }
    }
    if !headers.contains("host") {
        if let Some(server) = param(params, "SERVER_NAME") {
            headers.push("Host", server);
        }
    }

    Request {
        method: CompactString::from(param(params, "REQUEST_METHOD").unwrap_or("GET")),
        target,
        version: CompactString::from(
            param(params, "SERVER_PROTOCOL")
                .filter(|v| v.starts_with("HTTP/"))
                .unwrap_or("HTTP/1.1"),
        ),
        headers,
    }
}

/// Response standing in for output that could not be read; status 0.
fn no_response() -> Response {
    Response {
        version: CompactString::from("HTTP/1.1"),
        status: 0,
        reason: String::new(),
        headers: Headers::new(),
    }
}

/// Split CGI output into a response head and body.
///
/// Output whose head cannot be parsed becomes the body of a status 0
/// response, alongside the problem found.
fn cgi_response(stdout: Vec<u8>) -> (Response, Bytes, Option<String>) {
    let mut raw = [EMPTY_HEADER; MAX_HEADERS];
    let parsed = match httparse::parse_headers(&stdout, &mut raw) {
        Ok(Status::Complete((header_len, parsed))) => {
            Ok((header_len, Headers::from_httparse(parsed)))
        }
        Ok(Status::Partial) => Err("incomplete CGI response head".to_string()),
        Err(e) => Err(format!("invalid CGI response head: {e}")),
    };
    let (header_len, mut headers) = match parsed {
        Ok(parsed) => parsed,
        Err(problem) => return (no_response(), Bytes::from(stdout), Some(problem)),
    };

    let mut problem = None;
    let (status, reason) = match headers.get("status").map(parse_status) {
        Some(Ok(status)) => status,
        Some(Err(e)) => {
            problem = Some(e);
            (0, String::new())
        }
        None if headers.contains("location") => (302, "Found".to_string()),
        None => (200, "OK".to_string()),
    };
    headers.remove("status");

    let response = Response {
        version: CompactString::from("HTTP/1.1"),
        status,
        reason,
        headers,
    };
    (response, Bytes::from(stdout).slice(header_len..), problem)
}

/// `Status: 404 Not Found`
fn parse_status(value: &str) -> Result<(u16, String), String> {
    let value = value.trim();
    let (code, reason) = value.split_once(' ').unwrap_or((value, ""));
    let status = code
        .parse::<u16>()
        .map_err(|_| format!("invalid Status header {value:?}"))?;
    Ok((status, reason.trim().to_string()))
}
