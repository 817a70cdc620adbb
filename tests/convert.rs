//! Capture files to HAR archives through the library entry point.

use std::io::Write;

use etherparse::PacketBuilder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use pcaphar::{convert, ConvertOptions};
use pcaphar_core::{AssemblyConfig, ReaderConfig};

const T0: i64 = 1_589_900_000_000_000;
const CLIENT_IP: [u8; 4] = [192, 168, 1, 10];
const SERVER_IP: [u8; 4] = [192, 168, 1, 20];

/// TCP connection whose sequence numbers advance as data is sent.
struct Connection {
    client_port: u16,
    server_port: u16,
    client_seq: u32,
    server_seq: u32,
}

impl Connection {
    fn new(client_port: u16, server_port: u16) -> Self {
        Self {
            client_port,
            server_port,
            client_seq: 1000,
            server_seq: 9000,
        }
    }
}

/// Legacy pcap written frame by frame.
#[derive(Default)]
struct Capture {
    frames: Vec<(i64, Vec<u8>)>,
}

impl Capture {
    fn segment(
        &mut self,
        at_us: i64,
        conn: &mut Connection,
        from_client: bool,
        syn: bool,
        fin: bool,
        payload: &[u8],
    ) {
        let (src, dst, sport, dport, seq) = if from_client {
            (CLIENT_IP, SERVER_IP, conn.client_port, conn.server_port, &mut conn.client_seq)
        } else {
            (SERVER_IP, CLIENT_IP, conn.server_port, conn.client_port, &mut conn.server_seq)
        };
        let mut builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
            .ipv4(src, dst, 64)
            .tcp(sport, dport, *seq, 65535);
        if syn {
            builder = builder.syn();
        }
        if fin {
            builder = builder.fin();
        }
        let mut frame = Vec::new();
        builder.write(&mut frame, payload).unwrap();
        self.frames.push((at_us, frame));

        *seq = seq.wrapping_add(payload.len() as u32 + u32::from(syn) + u32::from(fin));
    }

    /// Handshake, one message each way, then both FINs.
    fn exchange(&mut self, at_us: i64, conn: &mut Connection, request: &[u8], response: &[u8]) {
        self.segment(at_us, conn, true, true, false, b"");
        self.segment(at_us + 100, conn, false, true, false, b"");
        self.segment(at_us + 2_000, conn, true, false, false, request);
        self.segment(at_us + 12_000, conn, false, false, false, response);
        self.segment(at_us + 15_000, conn, true, false, true, b"");
        self.segment(at_us + 15_100, conn, false, false, true, b"");
    }

    fn bytes(&self) -> Vec<u8> {
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
        out
    }

    fn write(&self) -> NamedTempFile {
        write_file(&self.bytes())
    }
}

fn write_file(data: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    file
}

fn fcgi_record(kind: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![1, kind, 0, 1];
    out.extend_from_slice(&(content.len() as u16).to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(content);
    out
}

async fn to_json(files: &[&NamedTempFile], options: ConvertOptions) -> serde_json::Value {
    let paths: Vec<_> = files.iter().map(|f| f.path()).collect();
    let (har, _) = convert(&paths, options).await.unwrap();
    let mut out = Vec::new();
    har.write_json(&mut out, true).unwrap();
    serde_json::from_slice(&out).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_http_exchange_to_har() {
    let mut capture = Capture::default();
    capture.exchange(
        T0,
        &mut Connection::new(51000, 80),
        b"GET /search?q=rust&page=2 HTTP/1.1\r\nHost: example.com\r\nCookie: sid=abc\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello",
    );
    let file = capture.write();

    let json = to_json(&[&file], ConvertOptions::default()).await;
    let log = &json["log"];
    assert_eq!(log["version"], "1.2");
    assert_eq!(log["creator"]["name"], "pcaphar");

    let entries = log["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry["request"]["method"], "GET");
    assert_eq!(entry["request"]["url"], "http://example.com/search?q=rust&page=2");
    assert_eq!(entry["request"]["queryString"][0]["name"], "q");
    assert_eq!(entry["request"]["cookies"][0]["value"], "abc");
    assert_eq!(entry["response"]["status"], 200);
    assert_eq!(entry["response"]["content"]["text"], "hello");
    assert_eq!(entry["response"]["content"]["mimeType"], "text/plain");
    assert_eq!(entry["startedDateTime"], "2020-05-19T14:53:20.002Z");
    assert_eq!(entry["serverIPAddress"], "192.168.1.20");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_files_share_one_archive_in_time_order() {
    let mut late = Capture::default();
    late.exchange(
        T0 + 5_000_000,
        &mut Connection::new(51001, 80),
        b"GET /second HTTP/1.1\r\nHost: a\r\n\r\n",
        b"HTTP/1.1 204 No Content\r\n\r\n",
    );
    let mut early = Capture::default();
    early.exchange(
        T0,
        &mut Connection::new(51002, 80),
        b"GET /first HTTP/1.1\r\nHost: a\r\n\r\n",
        b"HTTP/1.1 204 No Content\r\n\r\n",
    );
    let late = late.write();
    // Gzipped captures are read transparently
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&early.bytes()).unwrap();
    let early = write_file(&gz.finish().unwrap());

    let json = to_json(&[&late, &early], ConvertOptions::default()).await;
    let urls: Vec<_> = json["log"]["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["request"]["url"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(urls, ["http://a/first", "http://a/second"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_ports_filter() {
    let mut capture = Capture::default();
    capture.exchange(
        T0,
        &mut Connection::new(51000, 80),
        b"GET /web HTTP/1.1\r\nHost: a\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
    );
    capture.exchange(
        T0 + 1_000,
        &mut Connection::new(51001, 8080),
        b"GET /alt HTTP/1.1\r\nHost: a\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
    );
    let file = capture.write();

    let options = ConvertOptions {
        assembly: AssemblyConfig::default().with_server_ports([8080]),
        ..ConvertOptions::default()
    };
    let paths = [file.path()];
    let (har, summary) = convert(&paths, options).await.unwrap();
    assert_eq!(har.entries().len(), 1);
    assert_eq!(har.entries()[0].request.url, "http://a/alt");
    assert!(summary.assembly.filtered > 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_fastcgi_exit_status_in_entry() {
    let mut params = Vec::new();
    for (name, value) in [("REQUEST_METHOD", "GET"), ("REQUEST_URI", "/index.php")] {
        params.push(name.len() as u8);
        params.push(value.len() as u8);
        params.extend_from_slice(name.as_bytes());
        params.extend_from_slice(value.as_bytes());
    }
    let mut request = fcgi_record(1, &[0, 1, 0, 0, 0, 0, 0, 0]);
    request.extend(fcgi_record(4, &params));
    request.extend(fcgi_record(4, b""));
    request.extend(fcgi_record(5, b""));

    let mut response = fcgi_record(6, b"Content-Type: text/html\r\n\r\n<p>hi</p>");
    response.extend(fcgi_record(6, b""));
    response.extend(fcgi_record(3, &[0, 0, 0, 7, 0, 0, 0, 0]));

    let mut capture = Capture::default();
    capture.exchange(T0, &mut Connection::new(40000, 9000), &request, &response);
    let file = capture.write();

    let options = ConvertOptions {
        reader: ReaderConfig::default().with_protocol("fastcgi"),
        ..ConvertOptions::default()
    };
    let json = to_json(&[&file], options).await;
    let entry = &json["log"]["entries"][0];
    assert!(entry["request"]["url"].as_str().unwrap().ends_with("/index.php"));
    assert_eq!(entry["_exitStatus"], 7);
    assert_eq!(entry["response"]["content"]["text"], "<p>hi</p>");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_truncated_capture_keeps_earlier_packets() {
    let mut capture = Capture::default();
    capture.exchange(
        T0,
        &mut Connection::new(51000, 80),
        b"GET /kept HTTP/1.1\r\nHost: a\r\n\r\n",
        b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
    );
    let mut bytes = capture.bytes();
    // Record header promising more data than the file holds
    bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0, 0, 0, 0xff, 0, 0, 0, 1, 2]);
    let file = write_file(&bytes);

    let paths = [file.path()];
    let (har, _) = convert(&paths, ConvertOptions::default()).await.unwrap();
    assert_eq!(har.entries().len(), 1);
    assert_eq!(har.entries()[0].request.url, "http://a/kept");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_file_is_an_error() {
    let err = convert(&["/nonexistent/capture.pcap"], ConvertOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("/nonexistent/capture.pcap"));
}
