//! TCP segment extraction from captured frames.

use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::flow::Flow;
use crate::pcap::linktype;

/// Length of a Linux cooked capture (SLL) header.
const SLL_HEADER_LEN: usize = 16;

/// The parts of a TCP segment the assembler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    /// Parse a frame of the given link type. `None` for anything that is not
    /// TCP over IPv4 or IPv6, including truncated frames.
    pub fn parse(link_type: u16, frame: &'a [u8]) -> Option<Self> {
        let sliced = match link_type {
            linktype::ETHERNET => SlicedPacket::from_ethernet(frame).ok()?,
            linktype::RAW | linktype::IPV4 | linktype::IPV6 => SlicedPacket::from_ip(frame).ok()?,
            linktype::LINUX_SLL => {
                let ip = frame.get(SLL_HEADER_LEN..)?;
                SlicedPacket::from_ip(ip).ok()?
            }
            _ => return None,
        };

        let (src_ip, dst_ip) = match sliced.net? {
            NetSlice::Ipv4(ipv4) => {
                let header = ipv4.header();
                (
                    IpAddr::V4(header.source_addr()),
                    IpAddr::V4(header.destination_addr()),
                )
            }
            NetSlice::Ipv6(ipv6) => {
                let header = ipv6.header();
                (
                    IpAddr::V6(header.source_addr()),
                    IpAddr::V6(header.destination_addr()),
                )
            }
            #[allow(unreachable_patterns)]
            _ => return None,
        };

        let TransportSlice::Tcp(tcp) = sliced.transport? else {
            return None;
        };

        Some(Self {
            src_ip,
            dst_ip,
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
            seq: tcp.sequence_number(),
            syn: tcp.syn(),
            fin: tcp.fin(),
            rst: tcp.rst(),
            payload: tcp.payload(),
        })
    }

    pub fn ip_flow(&self) -> Flow {
        Flow::ip(self.src_ip, self.dst_ip)
    }

    pub fn port_flow(&self) -> Flow {
        Flow::ports(self.src_port, self.dst_port)
    }
}
