//! Reader configuration.

/// Default capacity of the completion sink.
pub const DEFAULT_SINK_CAPACITY: usize = 64;

/// Default size of one read from a directional stream.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Settings shared by every conversation builder of one run.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Conversations buffered between builders and the aggregator before
    /// finalizing workers block.
    pub sink_capacity: usize,
    /// Bytes requested from a stream per read.
    pub read_chunk_size: usize,
    /// Decoder name to use for every connection; detected from the first bytes when `None`.
    pub protocol: Option<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            sink_capacity: DEFAULT_SINK_CAPACITY,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            protocol: None,
        }
    }
}

impl ReaderConfig {
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn with_sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity.max(1);
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }
}
