//! Fan-in channel from conversation builders to the aggregator.

use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc;

use crate::conversation::Conversation;

/// Bounded, closable sender side of the completion channel.
///
/// Every builder publishes through the same sink. The channel closes once
/// [`close`](Self::close) is called, which the stream factory does after
/// its join barrier.
#[derive(Debug)]
pub struct CompletionSink {
    tx: RwLock<Option<mpsc::Sender<Conversation>>>,
}

impl CompletionSink {
    pub fn new(tx: mpsc::Sender<Conversation>) -> Self {
        Self {
            tx: RwLock::new(Some(tx)),
        }
    }

    /// Sink plus the receiver the aggregator drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Conversation>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    fn sender(&self) -> Option<mpsc::Sender<Conversation>> {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish from a blocking worker, waiting while the channel is full.
    ///
    /// Returns `false` if the sink is closed or the receiver is gone.
    /// Must not be called from async code.
    pub fn publish_blocking(&self, conversation: Conversation) -> bool {
        match self.sender() {
            Some(tx) => tx.blocking_send(conversation).is_ok(),
            None => false,
        }
    }

    /// Publish from async code.
    pub async fn publish(&self, conversation: Conversation) -> bool {
        match self.sender() {
            Some(tx) => tx.send(conversation).await.is_ok(),
            None => false,
        }
    }

    /// Drop the sink's sender so the receiver sees end of stream once
    /// in-flight publishes finish.
    pub fn close(&self) {
        self.tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |tx| tx.is_closed())
    }
}
