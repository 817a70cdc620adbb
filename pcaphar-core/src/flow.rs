//! Flow identifiers and connection address normalization.
//!
//! A [`Flow`] names one direction of a connection at one layer (network or
//! transport). Two directional streams belong to the same connection when
//! their flows are reverses of each other at every layer; [`normalize`]
//! folds both orientations onto one [`ConnectionAddress`].

use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use smallvec::SmallVec;

/// Layer an [`Endpoint`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndpointKind {
    Ipv4,
    Ipv6,
    TcpPort,
}

/// One side of a flow: an opaque byte string tagged with its layer.
///
/// Endpoints are totally ordered by kind, then length, then bytes, so the
/// order is independent of which direction of a connection is seen first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    kind: EndpointKind,
    raw: SmallVec<[u8; 16]>,
}

impl Endpoint {
    pub fn new(kind: EndpointKind, raw: &[u8]) -> Self {
        Self {
            kind,
            raw: SmallVec::from_slice(raw),
        }
    }

    pub fn ip(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self::new(EndpointKind::Ipv4, &v4.octets()),
            IpAddr::V6(v6) => Self::new(EndpointKind::Ipv6, &v6.octets()),
        }
    }

    pub fn port(port: u16) -> Self {
        Self::new(EndpointKind::TcpPort, &port.to_be_bytes())
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Interpret the endpoint as an IP address, if it is one.
    pub fn to_ip(&self) -> Option<IpAddr> {
        match self.kind {
            EndpointKind::Ipv4 => {
                let octets: [u8; 4] = self.raw.as_slice().try_into().ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            EndpointKind::Ipv6 => {
                let octets: [u8; 16] = self.raw.as_slice().try_into().ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(octets)))
            }
            EndpointKind::TcpPort => None,
        }
    }

    /// Interpret the endpoint as a TCP port, if it is one.
    pub fn to_port(&self) -> Option<u16> {
        match self.kind {
            EndpointKind::TcpPort => {
                let bytes: [u8; 2] = self.raw.as_slice().try_into().ok()?;
                Some(u16::from_be_bytes(bytes))
            }
            _ => None,
        }
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.raw.len().cmp(&other.raw.len()))
            .then_with(|| self.raw.as_slice().cmp(other.raw.as_slice()))
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = self.to_ip() {
            return write!(f, "{ip}");
        }
        if let Some(port) = self.to_port() {
            return write!(f, "{port}");
        }
        for byte in self.raw.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Directional addressing at one layer: source and destination endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Flow {
    src: Endpoint,
    dst: Endpoint,
}

impl Flow {
    pub fn new(src: Endpoint, dst: Endpoint) -> Self {
        Self { src, dst }
    }

    /// Network-layer flow between two IP addresses.
    pub fn ip(src: IpAddr, dst: IpAddr) -> Self {
        Self::new(Endpoint::ip(src), Endpoint::ip(dst))
    }

    /// Transport-layer flow between two TCP ports.
    pub fn ports(src: u16, dst: u16) -> Self {
        Self::new(Endpoint::port(src), Endpoint::port(dst))
    }

    pub fn src(&self) -> &Endpoint {
        &self.src
    }

    pub fn dst(&self) -> &Endpoint {
        &self.dst
    }

    pub fn endpoints(&self) -> (&Endpoint, &Endpoint) {
        (&self.src, &self.dst)
    }

    /// The same flow seen from the other direction.
    pub fn reverse(&self) -> Self {
        Self {
            src: self.dst.clone(),
            dst: self.src.clone(),
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.src, self.dst)
    }
}

/// Which end of a connection a directional stream was sent by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Client to server; carries requests.
    Client,
    /// Server to client; carries responses.
    Server,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Client => Side::Server,
            Side::Server => Side::Client,
        }
    }
}

/// Canonical, undirected key of one connection.
///
/// The flows are stored in client-to-server orientation as chosen by
/// [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionAddress {
    pub ip: Flow,
    pub port: Flow,
}

impl ConnectionAddress {
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.ip.src().to_ip()
    }

    pub fn server_ip(&self) -> Option<IpAddr> {
        self.ip.dst().to_ip()
    }

    pub fn client_port(&self) -> Option<u16> {
        self.port.src().to_port()
    }

    pub fn server_port(&self) -> Option<u16> {
        self.port.dst().to_port()
    }
}

impl fmt::Display for ConnectionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (src, dst) = self.ip.endpoints();
        let (sport, dport) = self.port.endpoints();
        write!(f, "{src}:{sport} - {dst}:{dport}")
    }
}

/// Fold a directional `(ip, port)` flow pair onto its connection address.
///
/// Transport endpoints are compared first, network endpoints break ties.
/// The orientation with the smaller source is the canonical client-to-server
/// one: a stream already in that orientation is the [`Side::Client`] stream
/// and its flows are stored as-is, otherwise the reversed flows are stored
/// and the stream is the [`Side::Server`] stream.
///
/// A flow whose reverse is itself (identical source and destination at both
/// layers) is always reported as the client side.
pub fn normalize(ip: &Flow, port: &Flow) -> (ConnectionAddress, Side) {
    let forward = (port.src(), ip.src());
    let backward = (port.dst(), ip.dst());

    if forward <= backward {
        (
            ConnectionAddress {
                ip: ip.clone(),
                port: port.clone(),
            },
            Side::Client,
        )
    } else {
        (
            ConnectionAddress {
                ip: ip.reverse(),
                port: port.reverse(),
            },
            Side::Server,
        )
    }
}
