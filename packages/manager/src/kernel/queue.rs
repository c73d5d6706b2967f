//! Message queue abstractions for the settings bridge and status watcher.
//!
//! Provides trait-based consumer/publisher seams that allow swapping
//! between real NATS JetStream connections and test doubles.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

/// Acknowledgment handle for a single delivery.
///
/// Consumed on use: a delivery is either acked or nacked, exactly once.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<()>;
    /// Negative acknowledgment. Redelivery policy (retry limits,
    /// dead-lettering) belongs to the broker, not this service.
    async fn nack(self: Box<Self>);
}

/// One received settings message plus its acknowledgment handle.
pub struct SettingsDelivery {
    payload: Bytes,
    acker: Box<dyn Acker>,
}

impl SettingsDelivery {
    pub fn new(payload: Bytes, acker: Box<dyn Acker>) -> Self {
        Self { payload, acker }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(self) {
        self.acker.nack().await
    }
}

/// Trait for the inbound settings subscription.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Block until the next delivery. `Ok(None)` means the subscription
    /// has closed and no further messages will arrive.
    async fn receive(&mut self) -> Result<Option<SettingsDelivery>>;

    /// Tear down the subscription.
    async fn close(&mut self);
}

/// Trait for outbound publish operations.
///
/// This allows swapping between real NATS and test mocks.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publish a message to a subject.
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// A published message.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// Outcome recorded for one test delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acked,
    Nacked,
}

/// Mock publisher that tracks published messages for testing.
///
/// This allows tests to inspect what messages would have been published
/// without requiring a real connection.
#[derive(Default)]
pub struct TestQueue {
    published: RwLock<Vec<PublishedMessage>>,
    fail_publishes: AtomicBool,
}

impl TestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish return an error.
    pub fn fail_publishes(&self) {
        self.fail_publishes.store(true, Ordering::SeqCst);
    }

    /// Get all published messages.
    pub fn published_messages(&self) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Get published messages for a specific subject.
    pub fn messages_for_subject(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Get the count of published messages.
    pub fn publish_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deserialize a published message payload as JSON.
    pub fn deserialize_message<T: serde::de::DeserializeOwned>(
        &self,
        msg: &PublishedMessage,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&msg.payload)
    }
}

#[async_trait]
impl QueuePublisher for TestQueue {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(anyhow!("simulated publish failure"));
        }
        self.published
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(PublishedMessage { subject, payload });
        Ok(())
    }
}

/// Mock consumer fed by the test, recording ack outcomes in order.
pub struct TestConsumer {
    state: Arc<TestConsumerState>,
}

#[derive(Default)]
struct TestConsumerState {
    pending: Mutex<VecDeque<Bytes>>,
    finished: AtomicBool,
    closed: AtomicBool,
    outcomes: Mutex<Vec<AckOutcome>>,
    notify: Notify,
}

/// Assertion handle shared with a [`TestConsumer`]; lets tests push
/// messages and inspect outcomes after the consumer has been moved
/// into a bridge.
#[derive(Clone)]
pub struct TestConsumerHandle {
    state: Arc<TestConsumerState>,
}

impl TestConsumer {
    pub fn new() -> (Self, TestConsumerHandle) {
        let state = Arc::new(TestConsumerState::default());
        (
            Self {
                state: state.clone(),
            },
            TestConsumerHandle { state },
        )
    }
}

impl TestConsumerHandle {
    /// Enqueue a raw payload for delivery.
    pub fn push(&self, payload: impl Into<Bytes>) {
        self.state
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(payload.into());
        // notify_one stores a permit, so a push that lands between the
        // consumer's empty-check and its await is not lost.
        self.state.notify.notify_one();
    }

    /// Enqueue a JSON-encoded payload for delivery.
    pub fn push_json<T: serde::Serialize>(&self, value: &T) {
        let payload = serde_json::to_vec(value).unwrap_or_else(|_| Vec::new());
        self.push(payload);
    }

    /// Signal end of stream: once drained, `receive` returns `Ok(None)`.
    pub fn finish(&self) {
        self.state.finished.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
    }

    pub fn outcomes(&self) -> Vec<AckOutcome> {
        self.state
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn acked_count(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|o| **o == AckOutcome::Acked)
            .count()
    }

    pub fn nacked_count(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|o| **o == AckOutcome::Nacked)
            .count()
    }

    pub fn was_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

struct TestAcker {
    state: Arc<TestConsumerState>,
}

#[async_trait]
impl Acker for TestAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.state
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(AckOutcome::Acked);
        Ok(())
    }

    async fn nack(self: Box<Self>) {
        self.state
            .outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(AckOutcome::Nacked);
    }
}

#[async_trait]
impl MessageConsumer for TestConsumer {
    async fn receive(&mut self) -> Result<Option<SettingsDelivery>> {
        loop {
            let popped = self
                .state
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front();

            if let Some(payload) = popped {
                return Ok(Some(SettingsDelivery::new(
                    payload,
                    Box::new(TestAcker {
                        state: self.state.clone(),
                    }),
                )));
            }

            if self.state.finished.load(Ordering::SeqCst) {
                return Ok(None);
            }

            self.state.notify.notified().await;
        }
    }

    async fn close(&mut self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_records_publishes() {
        let queue = TestQueue::new();

        queue
            .publish(
                "workspace.status".to_string(),
                Bytes::from(r#"{"workspaceName":"geo-1"}"#),
            )
            .await
            .unwrap();

        assert_eq!(queue.publish_count(), 1);
        assert_eq!(queue.messages_for_subject("workspace.status").len(), 1);
        assert!(queue.messages_for_subject("other").is_empty());
    }

    #[tokio::test]
    async fn test_queue_simulates_failures() {
        let queue = TestQueue::new();
        queue.fail_publishes();

        let result = queue.publish("workspace.status".to_string(), Bytes::new()).await;
        assert!(result.is_err());
        assert_eq!(queue.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_consumer_delivers_and_records_outcomes() {
        let (mut consumer, handle) = TestConsumer::new();
        handle.push(Bytes::from("one"));
        handle.push(Bytes::from("two"));
        handle.finish();

        let first = consumer.receive().await.unwrap().unwrap();
        assert_eq!(first.payload(), b"one");
        first.ack().await.unwrap();

        let second = consumer.receive().await.unwrap().unwrap();
        second.nack().await;

        assert!(consumer.receive().await.unwrap().is_none());
        assert_eq!(
            handle.outcomes(),
            vec![AckOutcome::Acked, AckOutcome::Nacked]
        );
    }

    #[tokio::test]
    async fn test_consumer_wakes_on_late_push() {
        let (mut consumer, handle) = TestConsumer::new();

        let pusher = tokio::spawn({
            let handle = handle.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                handle.push(Bytes::from("late"));
            }
        });

        let delivery = consumer.receive().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"late");
        delivery.ack().await.unwrap();
        pusher.await.unwrap();
    }
}
