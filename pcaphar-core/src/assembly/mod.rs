//! TCP reassembly feeding the stream factory.
//!
//! The [`Assembler`] turns captured packets into one ordered byte stream per
//! TCP direction. Each direction gets a [`PipeReader`](pipe::PipeReader)
//! handed to [`StreamFactory::new_stream`] on its first packet; in-order
//! bytes are written to it as they become contiguous, each chunk carrying
//! the capture time of the segment it came from.

mod buffer;
mod pipe;
mod segment;

use std::collections::HashMap;

use tracing::{debug, trace};

pub use buffer::{BufferStats, Chunk, SegmentBuffer};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use segment::TcpSegment;

use crate::factory::StreamFactory;
use crate::flow::Flow;
use crate::pcap::RawPacket;
use crate::timed::CaptureClock;

/// Which TCP segments are reassembled.
#[derive(Debug, Clone, Default)]
pub struct AssemblyConfig {
    /// Only keep segments to or from these ports. Empty keeps everything.
    pub server_ports: Vec<u16>,
}

impl AssemblyConfig {
    pub fn with_server_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.server_ports = ports.into_iter().collect();
        self
    }

    pub fn allows(&self, src_port: u16, dst_port: u16) -> bool {
        self.server_ports.is_empty()
            || self.server_ports.contains(&src_port)
            || self.server_ports.contains(&dst_port)
    }
}

/// Counters for one reassembly run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    pub packets: u64,
    pub tcp_segments: u64,
    pub non_tcp: u64,
    pub filtered: u64,
    /// Directional streams opened.
    pub streams: u64,
    pub retransmits: u64,
    pub out_of_order: u64,
    pub skipped_bytes: u64,
}

impl AssemblyStats {
    fn absorb(&mut self, buffer: BufferStats) {
        self.retransmits += buffer.retransmits;
        self.out_of_order += buffer.out_of_order;
        self.skipped_bytes += buffer.skipped_bytes;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    ip: Flow,
    port: Flow,
}

impl StreamKey {
    fn reverse(&self) -> Self {
        Self {
            ip: self.ip.reverse(),
            port: self.port.reverse(),
        }
    }
}

struct HalfStream {
    buffer: SegmentBuffer,
    writer: Option<PipeWriter>,
}

impl HalfStream {
    fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    fn send(&mut self, chunks: Vec<Chunk>) {
        let Some(writer) = &self.writer else {
            return;
        };
        for chunk in chunks {
            if !writer.send(chunk) {
                // Worker gone; keep ordering state but stop piping.
                self.writer = None;
                return;
            }
        }
    }

    /// Flush what is left and end the stream. Returns the buffer's counters
    /// the first time only.
    fn close(&mut self) -> Option<BufferStats> {
        if self.is_closed() {
            return None;
        }
        let rest = self.buffer.flush();
        self.send(rest);
        self.writer = None;
        Some(self.buffer.stats())
    }
}

/// Packet-driven reassembler owning the stream factory it feeds.
pub struct Assembler {
    factory: StreamFactory,
    config: AssemblyConfig,
    streams: HashMap<StreamKey, HalfStream>,
    stats: AssemblyStats,
}

impl Assembler {
    pub fn new(factory: StreamFactory, config: AssemblyConfig) -> Self {
        Self {
            factory,
            config,
            streams: HashMap::new(),
            stats: AssemblyStats::default(),
        }
    }

    /// Feed one captured packet. Must be called within a Tokio runtime.
    pub fn process(&mut self, packet: &RawPacket) {
        self.stats.packets += 1;
        let Some(segment) = TcpSegment::parse(packet.link_type, &packet.data) else {
            self.stats.non_tcp += 1;
            return;
        };
        if !self.config.allows(segment.src_port, segment.dst_port) {
            self.stats.filtered += 1;
            return;
        }
        self.stats.tcp_segments += 1;

        let key = StreamKey {
            ip: segment.ip_flow(),
            port: segment.port_flow(),
        };

        // A SYN on a closed direction starts a new connection on the same ports
        if segment.syn && self.streams.get(&key).is_some_and(HalfStream::is_closed) {
            self.streams.remove(&key);
        }
        if !self.streams.contains_key(&key) {
            let half = self.open(&key);
            self.streams.insert(key.clone(), half);
        }
        let Some(half) = self.streams.get_mut(&key) else {
            return;
        };
        if half.is_closed() {
            trace!("Ignoring segment after close on {} {}", key.ip, key.port);
            return;
        }

        let mut seq = segment.seq;
        if segment.syn {
            half.buffer.set_initial_seq(seq);
            seq = seq.wrapping_add(1);
        }
        if !segment.payload.is_empty() {
            let chunks = half.buffer.push(seq, segment.payload, packet.timestamp_us);
            half.send(chunks);
        }

        if segment.fin || segment.rst {
            if let Some(stats) = half.close() {
                self.stats.absorb(stats);
            }
        }
        if segment.rst {
            if let Some(stats) = self.streams.get_mut(&key.reverse()).and_then(HalfStream::close) {
                self.stats.absorb(stats);
            }
        }
    }

    fn open(&mut self, key: &StreamKey) -> HalfStream {
        let clock = CaptureClock::new();
        let (writer, reader) = pipe(clock.clone());
        self.factory
            .new_stream(key.ip.clone(), key.port.clone(), reader, clock);
        self.stats.streams += 1;
        trace!("Opened stream {} {}", key.ip, key.port);
        HalfStream {
            buffer: SegmentBuffer::new(),
            writer: Some(writer),
        }
    }

    /// Close every open direction, skipping gaps that were never filled.
    pub fn flush_all(&mut self) {
        let mut closed = 0;
        for half in self.streams.values_mut() {
            if let Some(stats) = half.close() {
                self.stats.absorb(stats);
                closed += 1;
            }
        }
        debug!("Closed {} open streams at end of input", closed);
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats
    }

    /// Close everything and hand back the factory for its join barrier.
    pub fn into_factory(mut self) -> (StreamFactory, AssemblyStats) {
        self.flush_all();
        (self.factory, self.stats)
    }
}
