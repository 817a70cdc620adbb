//! Capture file to conversations through TCP reassembly.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use etherparse::PacketBuilder;
use tempfile::NamedTempFile;

use pcaphar_core::{
    Assembler, AssemblyConfig, AssemblyStats, CompletionSink, Conversation,
    ConversationAggregator, ConversationReader, PcapReader, ReaderConfig, StreamFactory,
};

const CLIENT: ([u8; 4], u16) = ([10, 0, 0, 1], 51000);
const SERVER: ([u8; 4], u16) = ([10, 0, 0, 2], 80);

#[derive(Default, Clone, Copy)]
struct Flags {
    syn: bool,
    fin: bool,
    rst: bool,
}

const NONE: Flags = Flags {
    syn: false,
    fin: false,
    rst: false,
};
const SYN: Flags = Flags { syn: true, ..NONE };
const FIN: Flags = Flags { fin: true, ..NONE };
const RST: Flags = Flags { rst: true, ..NONE };

/// Legacy pcap written frame by frame.
struct Capture {
    frames: Vec<(i64, Vec<u8>)>,
}

impl Capture {
    fn new() -> Self {
        Self { frames: Vec::new() }
    }

    fn tcp(&mut self, at_us: i64, from_client: bool, seq: u32, flags: Flags, payload: &[u8]) {
        let ((src, sport), (dst, dport)) = if from_client {
            (CLIENT, SERVER)
        } else {
            (SERVER, CLIENT)
        };
        let mut builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .ipv4(src, dst, 64)
            .tcp(sport, dport, seq, 65535);
        if flags.syn {
            builder = builder.syn();
        }
        if flags.fin {
            builder = builder.fin();
        }
        if flags.rst {
            builder = builder.rst();
        }
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        self.frames.push((at_us, frame));
    }

    fn udp(&mut self, at_us: i64) {
        let builder = PacketBuilder::ethernet2([0; 6], [0; 6])
            .ipv4([10, 0, 0, 9], [10, 0, 0, 53], 64)
            .udp(5353, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, b"query").unwrap();
        self.frames.push((at_us, frame));
    }

    fn write(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        for (at_us, frame) in &self.frames {
            out.extend_from_slice(&((at_us / 1_000_000) as u32).to_le_bytes());
            out.extend_from_slice(&((at_us % 1_000_000) as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
        }
        file.write_all(&out).unwrap();
        file.flush().unwrap();
        file
    }
}

async fn convert(capture: &Capture, config: AssemblyConfig) -> (AssemblyStats, Vec<Conversation>) {
    let file = capture.write();
    let (sink, rx) = CompletionSink::channel(4);
    let reader = Arc::new(ConversationReader::new(sink, ReaderConfig::default()).unwrap());
    let collector = tokio::spawn(ConversationAggregator::collect(rx));

    let mut assembler = Assembler::new(StreamFactory::new(reader), config);
    for packet in PcapReader::open(file.path()).unwrap() {
        assembler.process(&packet.unwrap());
    }
    let (factory, stats) = assembler.into_factory();
    factory.finish().await;

    (stats, collector.await.unwrap().finalize())
}

fn at(us: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(us as u64)
}

const T0: i64 = 1_600_000_000_000_000;

#[tokio::test(flavor = "multi_thread")]
async fn test_reorders_and_drops_retransmissions() {
    let head = b"GET /a HTTP/1.1\r\n";
    let tail = b"Host: example.com\r\n\r\n";
    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";

    let mut capture = Capture::new();
    capture.tcp(T0, true, 1000, SYN, b"");
    capture.tcp(T0 + 100, false, 5000, SYN, b"");
    // Second half of the request overtakes the first, which is then retransmitted
    capture.tcp(T0 + 200, true, 1001 + head.len() as u32, NONE, tail);
    capture.tcp(T0 + 300, true, 1001, NONE, head);
    capture.tcp(T0 + 400, true, 1001, NONE, head);
    capture.udp(T0 + 450);
    capture.tcp(T0 + 500, false, 5001, NONE, response);
    capture.tcp(T0 + 600, true, 1001 + (head.len() + tail.len()) as u32, FIN, b"");
    capture.tcp(T0 + 700, false, 5001 + response.len() as u32, FIN, b"");

    let (stats, conversations) = convert(&capture, AssemblyConfig::default()).await;
    assert_eq!(stats.streams, 2);
    assert_eq!(stats.non_tcp, 1);
    assert_eq!(stats.retransmits, 1);
    assert_eq!(stats.out_of_order, 1);

    assert_eq!(conversations.len(), 1);
    let conversation = &conversations[0];
    let request = conversation.request.as_ref().unwrap();
    assert_eq!(request.target, "/a");
    assert_eq!(request.host(), Some("example.com"));
    assert_eq!(&conversation.response_body[..], b"hello");
    assert!(conversation.error.is_none());

    assert_eq!(conversation.started(), Some(at(T0 + 300)));
    assert_eq!(conversation.response_seen, vec![at(T0 + 500)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mid_stream_capture_and_gap_skipped_at_end() {
    let mut capture = Capture::new();
    // No handshake; the request is followed by a lost segment and a later one
    capture.tcp(T0, true, 7000, NONE, b"GET /first HTTP/1.1\r\n\r\n");
    capture.tcp(T0 + 10, false, 9000, NONE, b"HTTP/1.1 204 No Content\r\n\r\n");
    capture.tcp(T0 + 20, true, 7100, NONE, b"GET /second HTTP/1.1\r\n\r\n");

    let (stats, conversations) = convert(&capture, AssemblyConfig::default()).await;
    let first = "GET /first HTTP/1.1\r\n\r\n".len() as u64;
    assert_eq!(stats.skipped_bytes, 100 - first);

    assert_eq!(conversations.len(), 2);
    assert!(conversations[0].is_complete());
    assert_eq!(conversations[1].request.as_ref().unwrap().target, "/second");
    assert!(conversations[1].response.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_port_filter() {
    let mut capture = Capture::new();
    capture.tcp(T0, true, 1, NONE, b"GET / HTTP/1.1\r\n\r\n");
    capture.tcp(T0 + 1, false, 1, NONE, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let config = AssemblyConfig::default().with_server_ports([8080]);
    let (stats, conversations) = convert(&capture, config).await;
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.streams, 0);
    assert!(conversations.is_empty());

    let config = AssemblyConfig::default().with_server_ports([80]);
    let (stats, conversations) = convert(&capture, config).await;
    assert_eq!(stats.filtered, 0);
    assert_eq!(conversations.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reset_closes_both_directions() {
    let mut capture = Capture::new();
    capture.tcp(T0, true, 1, NONE, b"GET /reset HTTP/1.1\r\n\r\n");
    capture.tcp(T0 + 1, false, 1, NONE, b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial");
    capture.tcp(T0 + 2, true, 25, RST, b"");
    // Ignored: the direction is closed and this is not a new SYN
    capture.tcp(T0 + 3, false, 50, NONE, b"more body");

    let (_, conversations) = convert(&capture, AssemblyConfig::default()).await;
    assert_eq!(conversations.len(), 1);
    let conversation = &conversations[0];
    assert_eq!(conversation.request.as_ref().unwrap().target, "/reset");
    assert_eq!(&conversation.response_body[..], b"partial");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_port_reuse_after_close() {
    let mut capture = Capture::new();
    for (i, base) in [(0u32, T0), (1, T0 + 1_000_000)] {
        let path = format!("GET /{i} HTTP/1.1\r\n\r\n");
        capture.tcp(base, true, 100, SYN, b"");
        capture.tcp(base, false, 499, SYN, b"");
        capture.tcp(base + 1, true, 101, NONE, path.as_bytes());
        capture.tcp(base + 2, false, 500, NONE, b"HTTP/1.1 204 No Content\r\n\r\n");
        capture.tcp(base + 3, true, 101 + path.len() as u32, FIN, b"");
        capture.tcp(base + 4, false, 528, FIN, b"");
    }

    let (stats, conversations) = convert(&capture, AssemblyConfig::default()).await;
    assert_eq!(stats.streams, 4);
    let targets: Vec<_> = conversations
        .iter()
        .map(|c| c.request.as_ref().unwrap().target.as_str())
        .collect();
    assert_eq!(targets, ["/0", "/1"]);
}
