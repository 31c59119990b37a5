//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use diagbot_core::model::ConversationId;
use diagbot_core::traits::{ChatTransport, InboundMessage, OutboundMessage};

/// A scripted transport for exercising the serve loop without a chat backend.
///
/// Hands out the queued batches in order, then reports the transport as
/// closed. Every reply is recorded.
pub struct MockTransport {
    batches: Mutex<VecDeque<Vec<InboundMessage>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    fail_sends: bool,
    receive_count: AtomicU32,
}

impl MockTransport {
    /// Create a mock that delivers `batches` one per `receive` call.
    pub fn new(batches: Vec<Vec<InboundMessage>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            sent: Mutex::new(Vec::new()),
            fail_sends: false,
            receive_count: AtomicU32::new(0),
        }
    }

    /// Deliver each message as its own batch.
    pub fn sequential(messages: Vec<InboundMessage>) -> Self {
        Self::new(messages.into_iter().map(|m| vec![m]).collect())
    }

    /// Make every `send` fail.
    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    /// All replies sent so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Replies sent to one conversation, in order.
    pub fn sent_to(&self, conversation: &ConversationId) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.conversation == conversation)
            .cloned()
            .collect()
    }

    /// Number of `receive` calls made.
    pub fn receive_count(&self) -> u32 {
        self.receive_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn receive(&self) -> anyhow::Result<Option<Vec<InboundMessage>>> {
        self.receive_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.batches.lock().unwrap().pop_front())
    }

    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        if self.fail_sends {
            anyhow::bail!("mock send failure");
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_batches_then_closes() {
        let mock = MockTransport::new(vec![
            vec![InboundMessage::new("a", "/start")],
            vec![InboundMessage::new("b", "/help"), InboundMessage::new("a", "1")],
        ]);

        assert_eq!(mock.receive().await.unwrap().unwrap().len(), 1);
        assert_eq!(mock.receive().await.unwrap().unwrap().len(), 2);
        assert!(mock.receive().await.unwrap().is_none());
        assert_eq!(mock.receive_count(), 3);
    }

    #[tokio::test]
    async fn records_replies() {
        let mock = MockTransport::new(vec![]);
        let reply = OutboundMessage {
            conversation: "a".into(),
            text: "hello".into(),
            remove_keyboard: false,
        };
        mock.send(&reply).await.unwrap();
        assert_eq!(mock.sent(), vec![reply.clone()]);
        assert_eq!(mock.sent_to(&"a".into()), vec![reply]);
        assert!(mock.sent_to(&"b".into()).is_empty());
    }

    #[tokio::test]
    async fn failing_sends() {
        let mock = MockTransport::new(vec![]).failing_sends();
        let reply = OutboundMessage {
            conversation: "a".into(),
            text: "hello".into(),
            remove_keyboard: false,
        };
        assert!(mock.send(&reply).await.is_err());
        assert!(mock.sent().is_empty());
    }
}
