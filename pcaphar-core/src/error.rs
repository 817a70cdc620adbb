//! Error types for pcaphar-core.
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`PcapError`] - Errors from capture file reading
//! - [`DecodeError`] - Errors from application-layer decoding
//!
//! Decode errors inside a stream are normally recovered by the conversation
//! builder and attached to the affected conversation; they only surface as
//! `Err` values from APIs that decode a single buffer directly.

use thiserror::Error;

/// Main error type for pcaphar-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing a capture file
    #[error("PCAP error: {0}")]
    Pcap(#[from] PcapError),

    /// Error decoding an application-layer message
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Failure reading a directional stream
    #[error("Stream read error on {address}: {source}")]
    Stream {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// No decoder registered under the requested name
    #[error("Unknown protocol decoder: {0}")]
    UnknownDecoder(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to capture file reading.
#[derive(Error, Debug)]
pub enum PcapError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// Invalid capture format
    #[error("Invalid PCAP format: {reason}")]
    InvalidFormat { reason: String },

    /// Unsupported link type
    #[error("Unsupported link type: {link_type}")]
    UnsupportedLinkType { link_type: u16 },
}

/// Errors related to application-layer decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Malformed message framing
    #[error("{protocol}: {reason}")]
    Malformed {
        protocol: &'static str,
        reason: String,
    },

    /// Stream ended before a message head was complete
    #[error("{protocol}: stream ended inside a message head ({have} bytes buffered)")]
    Truncated { protocol: &'static str, have: usize },

    /// A response arrived with no request left to pair it with
    #[error("response without matching request")]
    UnmatchedResponse,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
