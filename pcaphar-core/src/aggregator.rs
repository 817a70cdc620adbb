//! Collection and chronological ordering of finished conversations.

use tokio::sync::mpsc;

use crate::conversation::Conversation;

/// Gathers conversations from every connection.
#[derive(Debug, Default)]
pub struct ConversationAggregator {
    conversations: Vec<Conversation>,
}

impl ConversationAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain `rx` until every sender is gone.
    pub async fn collect(mut rx: mpsc::Receiver<Conversation>) -> Self {
        let mut aggregator = Self::new();
        while let Some(conversation) = rx.recv().await {
            aggregator.push(conversation);
        }
        aggregator
    }

    /// Blocking variant of [`collect`](Self::collect) for non-async callers.
    pub fn collect_blocking(mut rx: mpsc::Receiver<Conversation>) -> Self {
        let mut aggregator = Self::new();
        while let Some(conversation) = rx.blocking_recv() {
            aggregator.push(conversation);
        }
        aggregator
    }

    pub fn push(&mut self, conversation: Conversation) {
        self.conversations.push(conversation);
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Conversations ordered by start time.
    ///
    /// The sort is stable; entries without any timestamp come first.
    pub fn finalize(mut self) -> Vec<Conversation> {
        self.conversations.sort_by_key(|c| c.started());
        self.conversations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{ConnectionAddress, Flow};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn conversation(port: u16, request: Option<u64>, response: Option<u64>) -> Conversation {
        let mut conversation = Conversation::new(ConnectionAddress {
            ip: Flow::ip([10, 0, 0, 1].into(), [10, 0, 0, 2].into()),
            port: Flow::ports(port, 80),
        });
        conversation.request_seen = request.map(at).into_iter().collect();
        conversation.response_seen = response.map(at).into_iter().collect();
        conversation
    }

    fn ports(conversations: &[Conversation]) -> Vec<u16> {
        conversations
            .iter()
            .map(|c| c.address.client_port().unwrap())
            .collect()
    }

    #[test]
    fn test_sorted_by_request_time() {
        let mut aggregator = ConversationAggregator::new();
        aggregator.push(conversation(1, Some(30), Some(31)));
        aggregator.push(conversation(2, Some(10), Some(40)));
        aggregator.push(conversation(3, Some(20), None));

        assert_eq!(ports(&aggregator.finalize()), vec![2, 3, 1]);
    }

    #[test]
    fn test_orphans_use_response_time_and_untimed_first() {
        let mut aggregator = ConversationAggregator::new();
        aggregator.push(conversation(1, Some(30), None));
        aggregator.push(conversation(2, None, Some(15)));
        aggregator.push(conversation(3, None, None));

        assert_eq!(ports(&aggregator.finalize()), vec![3, 2, 1]);
    }

    #[test]
    fn test_equal_times_keep_arrival_order() {
        let mut aggregator = ConversationAggregator::new();
        for port in [5, 4, 3] {
            aggregator.push(conversation(port, Some(10), None));
        }
        assert_eq!(ports(&aggregator.finalize()), vec![5, 4, 3]);
    }

    #[tokio::test]
    async fn test_collect_until_senders_dropped() {
        let (tx, rx) = mpsc::channel(2);
        let producer = tokio::spawn(async move {
            for port in 0..5 {
                tx.send(conversation(port, Some(100 - port as u64), None))
                    .await
                    .unwrap();
            }
        });

        let aggregator = ConversationAggregator::collect(rx).await;
        producer.await.unwrap();
        assert_eq!(aggregator.len(), 5);
        assert_eq!(ports(&aggregator.finalize()), vec![4, 3, 2, 1, 0]);
    }
}
