//! Convenient re-exports for common usage.
//!
//! ```rust,no_run
//! use pcaphar_core::prelude::*;
//!
//! let decoders = DecoderRegistry::with_defaults();
//! ```

// Pipeline
pub use crate::aggregator::ConversationAggregator;
pub use crate::assembly::{Assembler, AssemblyConfig};
pub use crate::factory::StreamFactory;
pub use crate::reader::ConversationReader;
pub use crate::sink::CompletionSink;

// Configuration
pub use crate::config::ReaderConfig;

// Results
pub use crate::conversation::Conversation;
pub use crate::decode::{DecoderRegistry, Headers, Request, Response};
pub use crate::flow::{ConnectionAddress, Flow, Side};

// Input
pub use crate::pcap::{PcapReader, RawPacket};

// Error types
pub use crate::error::{Error, Result};
