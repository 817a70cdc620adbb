//! Capture file reader with transparent gzip handling.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapNGReader};

use super::format::{Compression, PcapFormat};
use super::linktype;
use crate::error::{Error, PcapError};

/// Buffer size for pcap_parser readers (256KB).
const BUFFER_SIZE: usize = 262144;

/// Bytes gathered up front so the file header arrives in the parser's first read.
const PREFIX_LEN: usize = 65536;

type Source = BufReader<Box<dyn Read + Send>>;

/// One captured frame.
#[derive(Debug, Clone)]
pub struct RawPacket {
    /// 1-based position in the file.
    pub frame_number: u64,
    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: i64,
    pub captured_length: u32,
    pub original_length: u32,
    pub link_type: u16,
    pub data: Bytes,
}

enum ReaderInner {
    Legacy(LegacyPcapReader<Source>),
    Ng(PcapNGReader<Source>),
}

/// Reader for pcap and pcapng files, optionally gzip-compressed.
///
/// ```ignore
/// use pcaphar_core::pcap::PcapReader;
///
/// let mut reader = PcapReader::open("capture.pcap.gz")?;
/// while let Some(packet) = reader.next_packet()? {
///     println!("Frame {}: {} bytes", packet.frame_number, packet.data.len());
/// }
/// ```
pub struct PcapReader {
    inner: ReaderInner,
    format: PcapFormat,
    frame_number: u64,
    /// Link type per interface; legacy files have exactly one.
    link_types: Vec<u16>,
}

impl PcapReader {
    /// Open a capture file, detecting compression and format.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|_| {
            Error::Pcap(PcapError::FileNotFound {
                path: path.display().to_string(),
            })
        })?;
        Self::from_reader(file)
    }

    /// Read a capture from any byte source.
    pub fn from_reader<R: Read + Send + 'static>(mut source: R) -> Result<Self, Error> {
        let mut prefix = read_prefix(&mut source)?;
        let gzip = Compression::detect(&prefix) == Compression::Gzip;
        let mut source: Box<dyn Read + Send> = if gzip {
            let mut decoder = MultiGzDecoder::new(Cursor::new(prefix).chain(source));
            prefix = read_prefix(&mut decoder)?;
            Box::new(decoder)
        } else {
            Box::new(source)
        };

        let format = PcapFormat::detect(&prefix)?;
        // pcap_parser parses the file header from a single read
        source = Box::new(Cursor::new(prefix).chain(source));
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, source);

        let inner = if format.is_pcapng() {
            let reader = PcapNGReader::new(BUFFER_SIZE, buf_reader).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse PCAPNG: {}", e),
                })
            })?;
            ReaderInner::Ng(reader)
        } else {
            let reader = LegacyPcapReader::new(BUFFER_SIZE, buf_reader).map_err(|e| {
                Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Failed to parse legacy PCAP: {}", e),
                })
            })?;
            ReaderInner::Legacy(reader)
        };

        Ok(Self {
            inner,
            format,
            frame_number: 0,
            link_types: Vec::new(),
        })
    }

    pub fn format(&self) -> PcapFormat {
        self.format
    }

    /// Frames returned so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next packet.
    ///
    /// Returns `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>, Error> {
        match &mut self.inner {
            ReaderInner::Legacy(reader) => read_legacy_packet(
                reader,
                self.format.is_nanosecond(),
                &mut self.frame_number,
                &mut self.link_types,
            ),
            ReaderInner::Ng(reader) => {
                read_pcapng_packet(reader, &mut self.frame_number, &mut self.link_types)
            }
        }
    }
}

impl Iterator for PcapReader {
    type Item = Result<RawPacket, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

/// Read up to `PREFIX_LEN` bytes, stopping early only at end of input.
fn read_prefix<R: Read>(source: &mut R) -> Result<Vec<u8>, Error> {
    let mut prefix = Vec::with_capacity(PREFIX_LEN);
    source
        .by_ref()
        .take(PREFIX_LEN as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| {
            Error::Pcap(PcapError::InvalidFormat {
                reason: format!("Failed to read capture header: {}", e),
            })
        })?;
    if prefix.len() < 4 {
        return Err(Error::Pcap(PcapError::InvalidFormat {
            reason: "File too short".to_string(),
        }));
    }
    Ok(prefix)
}

fn read_legacy_packet<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    nanosecond: bool,
    frame_number: &mut u64,
    link_types: &mut Vec<u16>,
) -> Result<Option<RawPacket>, Error> {
    use pcap_parser::PcapError as PcapParserError;

    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;

                    let fraction = if nanosecond {
                        packet.ts_usec as i64 / 1_000
                    } else {
                        packet.ts_usec as i64
                    };
                    let raw = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us: (packet.ts_sec as i64) * 1_000_000 + fraction,
                        captured_length: packet.caplen,
                        original_length: packet.origlen,
                        link_type: link_types.first().copied().unwrap_or(linktype::ETHERNET),
                        data: Bytes::copy_from_slice(packet.data),
                    };

                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_types = vec![header.network.0 as u16];
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("Legacy PCAP refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("Legacy PCAP parse error: {}", e),
                }));
            }
        }
    }
}

fn read_pcapng_packet<S: Read>(
    reader: &mut PcapNGReader<S>,
    frame_number: &mut u64,
    link_types: &mut Vec<u16>,
) -> Result<Option<RawPacket>, Error> {
    use pcap_parser::pcapng::Block;
    use pcap_parser::PcapError as PcapParserError;

    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let packet = match block {
                    PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                        link_types.clear();
                        None
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                        link_types.push(idb.linktype.0 as u16);
                        None
                    }
                    PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                        *frame_number += 1;
                        Some(RawPacket {
                            frame_number: *frame_number,
                            timestamp_us: ((epb.ts_high as i64) << 32) | (epb.ts_low as i64),
                            captured_length: epb.caplen,
                            original_length: epb.origlen,
                            link_type: link_types
                                .get(epb.if_id as usize)
                                .copied()
                                .unwrap_or(linktype::ETHERNET),
                            data: Bytes::copy_from_slice(epb.data),
                        })
                    }
                    PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                        *frame_number += 1;
                        Some(RawPacket {
                            frame_number: *frame_number,
                            timestamp_us: 0,
                            captured_length: spb.data.len() as u32,
                            original_length: spb.origlen,
                            link_type: link_types.first().copied().unwrap_or(linktype::ETHERNET),
                            data: Bytes::copy_from_slice(spb.data),
                        })
                    }
                    _ => None,
                };

                reader.consume(offset);
                if packet.is_some() {
                    return Ok(packet);
                }
            }
            Err(PcapParserError::Eof) => return Ok(None),
            Err(PcapParserError::Incomplete(_)) => {
                reader.refill().map_err(|e| {
                    Error::Pcap(PcapError::InvalidFormat {
                        reason: format!("PCAPNG refill error: {}", e),
                    })
                })?;
            }
            Err(e) => {
                return Err(Error::Pcap(PcapError::InvalidFormat {
                    reason: format!("PCAPNG parse error: {}", e),
                }));
            }
        }
    }
}
