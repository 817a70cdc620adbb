//! Fuzz target for capture file reading and TCP segment extraction.
//!
//! Tests handling of malformed pcap/pcapng input including:
//! - Magic byte and compression detection
//! - Global header and record header parsing
//! - Link-layer decoding of each frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use pcaphar_core::assembly::TcpSegment;
use pcaphar_core::PcapReader;
use std::io::Cursor;

fuzz_target!(|data: &[u8]| {
    let Ok(reader) = PcapReader::from_reader(Cursor::new(data.to_vec())) else {
        return;
    };
    // Read all packets - should never panic
    for packet in reader.take(10_000) {
        let Ok(packet) = packet else {
            break;
        };
        let _ = TcpSegment::parse(packet.link_type, &packet.data);
    }
});
