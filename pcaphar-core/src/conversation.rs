//! Matched request/response pairs.

use std::net::IpAddr;
use std::time::SystemTime;

use bytes::Bytes;

use crate::decode::{Request, Response};
use crate::flow::{ConnectionAddress, Side};

/// One request/response exchange on a connection.
///
/// Either half may be missing: a request the capture never saw answered, or
/// a response with no request left to pair it with (flagged in `error`).
#[derive(Debug, Clone)]
pub struct Conversation {
    pub address: ConnectionAddress,
    pub request: Option<Request>,
    pub response: Option<Response>,
    pub request_body: Bytes,
    pub response_body: Bytes,
    /// Read time of the first and (when different) the last read of the request.
    pub request_seen: Vec<SystemTime>,
    pub response_seen: Vec<SystemTime>,
    /// Decode problems hit while building this entry, `; `-separated.
    pub error: Option<String>,
    /// Application exit status (FastCGI `END_REQUEST`).
    pub exit_status: Option<u32>,
    /// Normalized side the request travelled on. `Server` when the real
    /// client sorted after the server in address normalization.
    pub request_side: Option<Side>,
}

impl Conversation {
    pub fn new(address: ConnectionAddress) -> Self {
        Self {
            address,
            request: None,
            response: None,
            request_body: Bytes::new(),
            response_body: Bytes::new(),
            request_seen: Vec::new(),
            response_seen: Vec::new(),
            error: None,
            exit_status: None,
            request_side: None,
        }
    }

    /// When the exchange started: first request read, else first response read.
    pub fn started(&self) -> Option<SystemTime> {
        self.request_seen
            .first()
            .or_else(|| self.response_seen.first())
            .copied()
    }

    /// When the exchange ended: last response read, else last request read.
    pub fn finished(&self) -> Option<SystemTime> {
        self.response_seen
            .last()
            .or_else(|| self.request_seen.last())
            .copied()
    }

    /// Address of the end that answered the request.
    pub fn server_ip(&self) -> Option<IpAddr> {
        match self.request_side {
            Some(Side::Server) => self.address.client_ip(),
            _ => self.address.server_ip(),
        }
    }

    /// Port of the end that answered the request.
    pub fn server_port(&self) -> Option<u16> {
        match self.request_side {
            Some(Side::Server) => self.address.client_port(),
            _ => self.address.server_port(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.request.is_some() && self.response.is_some()
    }
}
