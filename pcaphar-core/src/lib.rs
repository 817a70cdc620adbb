//! # pcaphar-core
//!
//! Stream correlation and conversation building for HTTP and FastCGI
//! captures.
//!
//! Pairs of directional TCP byte streams are folded onto one connection,
//! decoded into requests and responses, paired by position and collected
//! into a chronologically ordered list of [`Conversation`]s ready for an
//! archive writer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pcaphar_core::prelude::*;
//!
//! # async fn run() -> pcaphar_core::Result<()> {
//! let config = ReaderConfig::default();
//! let (sink, rx) = CompletionSink::channel(config.sink_capacity);
//! let reader = Arc::new(ConversationReader::new(sink, config)?);
//!
//! let collector = tokio::spawn(ConversationAggregator::collect(rx));
//!
//! let mut assembler = Assembler::new(StreamFactory::new(reader), AssemblyConfig::default());
//! for packet in PcapReader::open("capture.pcap")? {
//!     assembler.process(&packet?);
//! }
//! let (factory, _) = assembler.into_factory();
//! factory.finish().await;
//!
//! let conversations = collector.await.expect("collector").finalize();
//! println!("{} conversations", conversations.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        pcaphar-core                                 |
//! +---------------------------------------------------------------------+
//! |  pcap/       - PCAP/PCAPNG reading, gzip                            |
//! |  assembly/   - TCP reassembly into directional streams              |
//! |  factory     - one blocking worker per stream, join barrier         |
//! |  reader      - per-stream entry point, address normalization        |
//! |  registry    - address -> builder, created exactly once             |
//! |  builder     - decode loop, request/response pairing                |
//! |  decode/     - HTTP/1.x and FastCGI decoders                        |
//! |  sink        - bounded completion channel                           |
//! |  aggregator  - collection and chronological ordering                |
//! +---------------------------------------------------------------------+
//! ```

pub mod aggregator;
pub mod assembly;
pub mod builder;
pub mod config;
pub mod conversation;
pub mod decode;
pub mod error;
pub mod factory;
pub mod flow;
pub mod pcap;
pub mod prelude;
pub mod reader;
pub mod registry;
pub mod sink;
pub mod timed;

pub use aggregator::ConversationAggregator;
pub use assembly::{Assembler, AssemblyConfig, AssemblyStats};
pub use builder::ConversationBuilder;
pub use config::ReaderConfig;
pub use conversation::Conversation;
pub use decode::{
    DecodeContext, DecodeResult, DecodedMessage, DecoderRegistry, FcgiDecoder, Headers,
    HttpDecoder, Message, MessageKind, ProtocolDecoder, Request, Response,
};
pub use error::{DecodeError, Error, PcapError, Result};
pub use factory::{FactoryStats, StreamFactory};
pub use flow::{normalize, ConnectionAddress, Endpoint, EndpointKind, Flow, Side};
pub use pcap::{PcapReader, RawPacket};
pub use reader::ConversationReader;
pub use registry::ConnectionRegistry;
pub use sink::CompletionSink;
pub use timed::{CaptureClock, Clock, TimedStreamReader, WallClock};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
