//! Capture file reading.
//!
//! The main types are:
//! - [`PcapReader`] - reads legacy pcap and pcapng, gzip-compressed or not
//! - [`RawPacket`] - one captured frame with its link type and timestamp

mod format;
mod reader;

pub use format::{Compression, PcapFormat};
pub use reader::{PcapReader, RawPacket};

/// Link-layer header types understood by the reassembler.
pub mod linktype {
    pub const ETHERNET: u16 = 1;
    pub const RAW: u16 = 101;
    pub const LINUX_SLL: u16 = 113;
    pub const IPV4: u16 = 228;
    pub const IPV6: u16 = 229;
}
