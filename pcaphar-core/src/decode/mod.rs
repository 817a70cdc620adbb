//! Application-layer decoders for directional streams.
//!
//! A [`ProtocolDecoder`] is stateless: the conversation builder owns the
//! buffer and calls [`decode`](ProtocolDecoder::decode) with everything it
//! has not consumed yet. The decoder answers with one of:
//!
//! - `Complete` - a message was decoded, drop `bytes_consumed` bytes
//! - `Skip` - bytes carry no message (interim responses, management records)
//! - `NeedMore` - read more data and call again
//! - `Error` - report the error, then skip `skip_bytes` or give up on the side
//!
//! When the stream ends with bytes still buffered the builder calls
//! [`finish`](ProtocolDecoder::finish) so partially captured messages can
//! still be surfaced.

mod fcgi;
mod http;
mod message;
mod registry;

pub use fcgi::FcgiDecoder;
pub use http::HttpDecoder;
pub use message::{DecodedMessage, Headers, Message, MessageKind, Request, Response};
pub use registry::DecoderRegistry;

use crate::error::DecodeError;
use crate::flow::Side;

/// Bytes buffered before a decoder is chosen for a connection.
pub const SNIFF_LEN: usize = 8;

/// What the caller knows about the stream being decoded.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    pub side: Side,
    /// Messages already decoded on this side.
    pub messages_decoded: usize,
    /// Kind of message this side has been carrying, once known.
    pub kind: Option<MessageKind>,
}

impl DecodeContext {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            messages_decoded: 0,
            kind: None,
        }
    }

    /// Message kind to try first: what the side has carried so far, else
    /// what its normalized side suggests.
    pub fn preferred(&self) -> MessageKind {
        self.kind
            .unwrap_or_else(|| MessageKind::expected_on(self.side))
    }
}

#[derive(Debug)]
pub enum DecodeResult {
    Complete {
        message: DecodedMessage,
        bytes_consumed: usize,
    },

    Skip {
        bytes_consumed: usize,
    },

    /// `minimum_bytes` is the buffered length below which decoding again
    /// cannot make progress.
    NeedMore {
        minimum_bytes: Option<usize>,
    },

    /// `skip_bytes == None` means no resync point was found.
    Error {
        error: DecodeError,
        skip_bytes: Option<usize>,
    },
}

/// Strategy for extracting messages from one direction of a connection.
pub trait ProtocolDecoder: Send + Sync {
    /// Protocol identifier (e.g., "http", "fastcgi").
    fn name(&self) -> &'static str;

    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Whether the first bytes of a stream look like this protocol.
    ///
    /// Called with at least [`SNIFF_LEN`] bytes unless the stream is shorter.
    fn sniff(&self, data: &[u8]) -> bool;

    /// Kind of message the first bytes of a stream start, if recognizable.
    fn classify(&self, data: &[u8]) -> Option<MessageKind> {
        let _ = data;
        None
    }

    fn decode(&self, data: &[u8], ctx: &DecodeContext) -> DecodeResult;

    /// Decode at end of stream, where `decode` asked for more data.
    ///
    /// Must not return `NeedMore` for data it could surface partially.
    fn finish(&self, data: &[u8], ctx: &DecodeContext) -> DecodeResult;
}
