//! Worker spawning and the end-of-input barrier.

use std::io::Read;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::flow::Flow;
use crate::reader::ConversationReader;
use crate::timed::Clock;

/// Counters reported by [`StreamFactory::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryStats {
    /// Directional streams handed to workers.
    pub streams: usize,
    /// Workers that panicked.
    pub failed_workers: usize,
    /// Conversations published after the barrier for one-sided connections.
    pub flushed: usize,
}

/// Spawns one blocking worker per directional stream.
///
/// `new_stream` must be called from within a Tokio runtime.
pub struct StreamFactory {
    reader: Arc<ConversationReader>,
    workers: JoinSet<()>,
    streams: usize,
}

impl StreamFactory {
    pub fn new(reader: Arc<ConversationReader>) -> Self {
        Self {
            reader,
            workers: JoinSet::new(),
            streams: 0,
        }
    }

    pub fn reader(&self) -> &Arc<ConversationReader> {
        &self.reader
    }

    /// Start decoding one direction of a connection.
    pub fn new_stream<R, C>(&mut self, ip: Flow, port: Flow, stream: R, clock: C)
    where
        R: Read + Send + 'static,
        C: Clock + 'static,
    {
        // Claimed here, in call order, not when the worker gets scheduled
        let (builder, side) = self.reader.claim(&ip, &port);
        let reader = Arc::clone(&self.reader);
        self.workers
            .spawn_blocking(move || reader.read_claimed(&builder, side, stream, clock));
        self.streams += 1;
    }

    /// Workers not yet joined.
    pub fn outstanding(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker, flush one-sided connections, close the sink.
    ///
    /// The receiver sees end of stream after this returns, so it must be
    /// drained concurrently when the sink can fill up.
    pub async fn finish(mut self) -> FactoryStats {
        let mut stats = FactoryStats {
            streams: self.streams,
            ..FactoryStats::default()
        };

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                warn!("Stream worker failed: {}", e);
                stats.failed_workers += 1;
            }
        }

        let sink = self.reader.sink();
        for conversation in self.reader.flush_unfinished() {
            if !sink.publish(conversation).await {
                warn!("Completion sink closed while flushing unfinished connections");
                break;
            }
            stats.flushed += 1;
        }
        sink.close();

        debug!(
            "Joined {} stream workers, flushed {} conversations",
            stats.streams, stats.flushed
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ConversationAggregator;
    use crate::config::ReaderConfig;
    use crate::sink::CompletionSink;
    use crate::timed::WallClock;
    use std::io::Cursor;

    fn factory() -> (StreamFactory, tokio::sync::mpsc::Receiver<crate::Conversation>) {
        let (sink, rx) = CompletionSink::channel(1);
        let reader = ConversationReader::new(sink, ReaderConfig::default()).unwrap();
        (StreamFactory::new(Arc::new(reader)), rx)
    }

    #[tokio::test]
    async fn test_finish_without_streams_closes_sink() {
        let (factory, mut rx) = factory();
        let stats = factory.finish().await;
        assert_eq!(stats, FactoryStats::default());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_finish_drains_through_small_sink() {
        let (mut factory, rx) = factory();
        let collector = tokio::spawn(ConversationAggregator::collect(rx));

        let ip = Flow::ip([10, 0, 0, 1].into(), [10, 0, 0, 2].into());
        let port = Flow::ports(80, 50000);
        let requests: String = (0..10).map(|i| format!("GET /{i} HTTP/1.1\r\n\r\n")).collect();
        factory.new_stream(ip.clone(), port.clone(), Cursor::new(requests.into_bytes()), WallClock);
        factory.new_stream(ip.reverse(), port.reverse(), Cursor::new(Vec::new()), WallClock);
        assert_eq!(factory.outstanding(), 2);

        let stats = factory.finish().await;
        assert_eq!(stats.streams, 2);
        assert_eq!(stats.flushed, 0);
        assert_eq!(collector.await.unwrap().len(), 10);
    }
}
