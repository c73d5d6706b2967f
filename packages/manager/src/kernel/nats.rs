//! NATS-backed implementations of the queue abstractions.
//!
//! Inbound settings arrive through a JetStream pull consumer with
//! explicit acks; outbound status envelopes go out as plain publishes.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::warn;

use async_nats::jetstream::{self, consumer::PullConsumer, AckKind};

use super::queue::{Acker, MessageConsumer, QueuePublisher, SettingsDelivery};

/// Real NATS client publisher.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QueuePublisher for NatsPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client.publish(subject, payload).await?;
        // publish only enqueues on the client buffer; flush so a
        // reported success means the server has the bytes.
        self.client.flush().await?;
        Ok(())
    }
}

/// JetStream pull consumer for the settings stream.
pub struct JetStreamConsumer {
    messages: jetstream::consumer::pull::Stream,
}

impl JetStreamConsumer {
    /// Bind to an existing stream and durable consumer.
    ///
    /// Stream provisioning and dead-letter policy are operated outside
    /// this service; here we only attach.
    pub async fn connect(
        client: async_nats::Client,
        stream_name: &str,
        consumer_name: &str,
    ) -> Result<Self> {
        let jetstream = jetstream::new(client);
        let stream = jetstream
            .get_stream(stream_name)
            .await
            .with_context(|| format!("failed to look up stream {stream_name}"))?;
        let consumer: PullConsumer = stream
            .get_consumer(consumer_name)
            .await
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("failed to look up consumer {consumer_name}"))?;
        let messages = consumer
            .messages()
            .await
            .context("failed to start consuming settings messages")?;
        Ok(Self { messages })
    }
}

#[async_trait]
impl MessageConsumer for JetStreamConsumer {
    async fn receive(&mut self) -> Result<Option<SettingsDelivery>> {
        match self.messages.next().await {
            Some(Ok(message)) => {
                let payload = message.payload.clone();
                Ok(Some(SettingsDelivery::new(
                    payload,
                    Box::new(JetStreamAcker { message }),
                )))
            }
            Some(Err(e)) => Err(anyhow!("settings subscription error: {e}")),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        // Dropping the message stream detaches the pull subscription;
        // unacked in-flight messages redeliver after their ack wait.
    }
}

struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acker for JetStreamAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        self.message.ack().await.map_err(|e| anyhow!("{e}"))
    }

    async fn nack(self: Box<Self>) {
        if let Err(e) = self.message.ack_with(AckKind::Nak(None)).await {
            warn!(error = %e, "failed to nack settings message");
        }
    }
}
