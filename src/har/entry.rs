//! Conversation to HAR entry conversion.

use std::io::Read;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use tracing::debug;
use url::Url;

use pcaphar_core::{Conversation, Headers};

use super::model::{
    Cache, Content, Cookie, Entry, Header, PostData, QueryParam, Request, Response, Timings,
};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

impl Entry {
    /// Build the archive entry for one conversation.
    pub fn from_conversation(conversation: &Conversation) -> Self {
        let timings = timings(conversation);
        Self {
            started_date_time: format_time(conversation.started().unwrap_or(UNIX_EPOCH)),
            time: timings.total(),
            request: request(conversation),
            response: response(conversation),
            cache: Cache::default(),
            timings,
            server_ip_address: conversation.server_ip().map(|ip| ip.to_string()),
            connection: Some(conversation.address.to_string()),
            comment: conversation.error.clone(),
            exit_status: conversation.exit_status,
        }
    }
}

fn format_time(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn millis_between(from: Option<&SystemTime>, to: Option<&SystemTime>) -> f64 {
    match (from, to) {
        (Some(from), Some(to)) => to
            .duration_since(*from)
            .map_or(0.0, |d| d.as_micros() as f64 / 1000.0),
        _ => 0.0,
    }
}

fn timings(conversation: &Conversation) -> Timings {
    let request_first = conversation.request_seen.first();
    let request_last = conversation.request_seen.last();
    let response_first = conversation.response_seen.first();
    let response_last = conversation.response_seen.last();

    Timings::new(
        millis_between(request_first, request_last),
        millis_between(request_last, response_first),
        millis_between(response_first, response_last),
    )
}

fn headers(headers: &Headers) -> Vec<Header> {
    headers
        .iter()
        .map(|(name, value)| Header {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

fn request(conversation: &Conversation) -> Request {
    let Some(request) = &conversation.request else {
        return Request {
            method: String::new(),
            url: String::new(),
            http_version: String::new(),
            cookies: Vec::new(),
            headers: Vec::new(),
            query_string: Vec::new(),
            post_data: None,
            headers_size: -1,
            body_size: -1,
        };
    };

    let url = request_url(conversation, &request.method, &request.target, request.host());
    let body = &conversation.request_body;
    let post_data = (!body.is_empty()).then(|| {
        let mime_type = request.headers.get("content-type").unwrap_or_default();
        let text = String::from_utf8_lossy(body).into_owned();
        let params = if mime_type.starts_with(FORM_URLENCODED) {
            url::form_urlencoded::parse(body)
                .map(|(name, value)| QueryParam {
                    name: name.into_owned(),
                    value: value.into_owned(),
                })
                .collect()
        } else {
            Vec::new()
        };
        PostData {
            mime_type: mime_type.to_string(),
            text,
            params,
        }
    });

    Request {
        method: request.method.to_string(),
        query_string: query_string(&url),
        url,
        http_version: request.version.to_string(),
        cookies: request
            .headers
            .get_all("cookie")
            .flat_map(request_cookies)
            .collect(),
        headers: headers(&request.headers),
        post_data,
        headers_size: -1,
        body_size: body.len() as i64,
    }
}

/// Absolute URL of a request: the target itself when absolute, else joined
/// to the Host header or the server address.
fn request_url(conversation: &Conversation, method: &str, target: &str, host: Option<&str>) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        return target.to_string();
    }
    if method.eq_ignore_ascii_case("CONNECT") {
        return format!("http://{target}");
    }

    let host = match host {
        Some(host) => host.to_string(),
        None => server_authority(conversation),
    };
    if target.starts_with('/') {
        format!("http://{host}{target}")
    } else {
        format!("http://{host}/{target}")
    }
}

fn server_authority(conversation: &Conversation) -> String {
    let host = match conversation.server_ip() {
        Some(IpAddr::V6(ip)) => format!("[{ip}]"),
        Some(ip) => ip.to_string(),
        None => "localhost".to_string(),
    };
    match conversation.server_port() {
        Some(80) | None => host,
        Some(port) => format!("{host}:{port}"),
    }
}

fn query_string(url: &str) -> Vec<QueryParam> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .query_pairs()
            .map(|(name, value)| QueryParam {
                name: name.into_owned(),
                value: value.into_owned(),
            })
            .collect(),
        Err(e) => {
            debug!("Unparseable request URL {:?}: {}", url, e);
            Vec::new()
        }
    }
}

fn request_cookies(header: &str) -> Vec<Cookie> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| cookie(name, value.trim()))
        })
        .collect()
}

fn cookie(name: &str, value: &str) -> Cookie {
    Cookie {
        name: name.to_string(),
        value: value.to_string(),
        path: None,
        domain: None,
        expires: None,
        http_only: None,
        secure: None,
    }
}

fn response_cookie(header: &str) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let mut cookie = cookie(name.trim(), value.trim());

    for attribute in parts {
        let (key, value) = match attribute.split_once('=') {
            Some((key, value)) => (key.trim(), Some(value.trim().to_string())),
            None => (attribute.trim(), None),
        };
        match key.to_ascii_lowercase().as_str() {
            "path" => cookie.path = value,
            "domain" => cookie.domain = value,
            "expires" => cookie.expires = value,
            "httponly" => cookie.http_only = Some(true),
            "secure" => cookie.secure = Some(true),
            _ => {}
        }
    }
    Some(cookie)
}

/// Undo a gzip or deflate content encoding. `None` if the encoding is not
/// one of those or the body does not decode.
fn decode_content(encoding: &str, body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let decoded = match encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => MultiGzDecoder::new(body).read_to_end(&mut out),
        // Servers send both zlib-wrapped and raw deflate
        "deflate" => ZlibDecoder::new(body).read_to_end(&mut out).or_else(|_| {
            out.clear();
            DeflateDecoder::new(body).read_to_end(&mut out)
        }),
        _ => return None,
    };
    match decoded {
        Ok(_) => Some(out),
        Err(e) => {
            debug!("Leaving {} content encoded: {}", encoding, e);
            None
        }
    }
}

fn response(conversation: &Conversation) -> Response {
    let Some(response) = &conversation.response else {
        return Response {
            status: 0,
            status_text: String::new(),
            http_version: String::new(),
            cookies: Vec::new(),
            headers: Vec::new(),
            content: Content {
                size: 0,
                compression: None,
                mime_type: String::new(),
                text: None,
            },
            redirect_url: String::new(),
            headers_size: -1,
            body_size: -1,
        };
    };

    let body = &conversation.response_body;
    let decoded = response
        .headers
        .get("content-encoding")
        .and_then(|encoding| decode_content(encoding, body));
    let content = match &decoded {
        Some(decoded) => Content {
            size: decoded.len() as i64,
            compression: Some(decoded.len() as i64 - body.len() as i64),
            mime_type: String::new(),
            text: Some(String::from_utf8_lossy(decoded).into_owned()),
        },
        None => Content {
            size: body.len() as i64,
            compression: None,
            mime_type: String::new(),
            text: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
        },
    };

    Response {
        status: response.status,
        status_text: response.reason.clone(),
        http_version: response.version.to_string(),
        cookies: response
            .headers
            .get_all("set-cookie")
            .filter_map(response_cookie)
            .collect(),
        headers: headers(&response.headers),
        content: Content {
            mime_type: response
                .headers
                .get("content-type")
                .unwrap_or_default()
                .to_string(),
            ..content
        },
        redirect_url: response.location().unwrap_or_default().to_string(),
        headers_size: -1,
        body_size: body.len() as i64,
    }
}
