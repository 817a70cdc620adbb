//! Per-stream entry point.

use std::io::{self, Read};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::builder::ConversationBuilder;
use crate::config::ReaderConfig;
use crate::conversation::Conversation;
use crate::decode::DecoderRegistry;
use crate::error::Result;
use crate::flow::{normalize, Flow, Side};
use crate::registry::ConnectionRegistry;
use crate::sink::CompletionSink;
use crate::timed::{Clock, TimedStreamReader};

/// Routes each directional stream to its connection's builder.
pub struct ConversationReader {
    registry: ConnectionRegistry,
    sink: Arc<CompletionSink>,
}

impl ConversationReader {
    /// Reader with the default decoders, or only the one named in `config`.
    pub fn new(sink: CompletionSink, config: ReaderConfig) -> Result<Self> {
        let mut decoders = DecoderRegistry::with_defaults();
        if let Some(protocol) = &config.protocol {
            decoders.force(protocol)?;
        }
        Ok(Self::with_decoders(decoders, sink, config))
    }

    pub fn with_decoders(
        decoders: DecoderRegistry,
        sink: CompletionSink,
        config: ReaderConfig,
    ) -> Self {
        let sink = Arc::new(sink);
        Self {
            registry: ConnectionRegistry::new(Arc::new(decoders), Arc::clone(&sink), config),
            sink,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn sink(&self) -> &CompletionSink {
        &self.sink
    }

    /// Decode one directional stream to its end.
    ///
    /// `ip` and `port` are the stream's own flows. A read failure is logged
    /// and the rest of the stream discarded; the side still counts as done.
    pub fn read_stream<R: Read, C: Clock>(&self, stream: R, clock: C, ip: &Flow, port: &Flow) {
        let (builder, side) = self.claim(ip, port);
        self.read_claimed(&builder, side, stream, clock);
    }

    /// Attach a stream with flows `ip` and `port` to its connection's builder.
    ///
    /// Claiming in stream arrival order keeps a later connection reusing the
    /// same address from joining an earlier one.
    pub fn claim(&self, ip: &Flow, port: &Flow) -> (Arc<ConversationBuilder>, Side) {
        let (address, side) = normalize(ip, port);
        (self.registry.claim(&address, side), side)
    }

    /// Decode a stream previously attached with [`claim`](Self::claim).
    pub fn read_claimed<R: Read, C: Clock>(
        &self,
        builder: &Arc<ConversationBuilder>,
        side: Side,
        stream: R,
        clock: C,
    ) {
        let address = builder.address();
        let mut stream = TimedStreamReader::with_clock(stream, clock);

        debug!("Reading {} side of {}", side.as_str(), address);
        let result = match side {
            Side::Client => builder.read_client_stream(&mut stream),
            Side::Server => builder.read_server_stream(&mut stream),
        };
        if let Err(e) = result {
            warn!("{}", e);
            if let Err(e) = io::copy(&mut stream, &mut io::sink()) {
                debug!("Discarding rest of {} failed: {}", address, e);
            }
        }

        if builder.read_done() {
            self.registry.remove(address, builder);
        }
    }

    /// Finalize every connection still waiting for a side.
    pub fn flush_unfinished(&self) -> Vec<Conversation> {
        self.registry
            .drain_unfinished()
            .iter()
            .flat_map(|builder| builder.finalize_unfinished())
            .collect()
    }
}
