//! Inbound settings consumer loop.
//!
//! Pulls settings messages off the queue, hands them to the operator,
//! and acknowledges based on the outcome. Runs as a [`Service`] with
//! cooperative shutdown: an in-flight message always finishes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::kernel::queue::{MessageConsumer, SettingsDelivery};
use crate::kernel::service_host::Service;
use crate::kernel::store::WorkspaceStore;
use crate::models::WorkspaceSettings;

use super::operator::WorkspaceOperator;

/// Bridge lifecycle, observable through [`SettingsBridge::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

enum Dispatch {
    /// Process in the receive loop; ack on success, nack on failure.
    Inline,
    /// Hand off to the processor task; ack at admission, nack and drop
    /// when the queue is full.
    Queued(mpsc::Sender<WorkspaceSettings>),
}

/// Consumer loop bridging the settings queue to the workspace store.
///
/// By default each message is processed inline, so the broker sees an
/// ack only after the store write succeeded. [`with_queue`] inserts a
/// bounded queue between receive and processing instead: the receive
/// loop never blocks on a slow store, at the cost of dropping (and
/// nacking) new messages while the queue is full and of acking admitted
/// messages before they are processed — a processing failure after
/// admission is logged, not redelivered.
///
/// [`with_queue`]: SettingsBridge::with_queue
pub struct SettingsBridge<S: WorkspaceStore> {
    consumer: Box<dyn MessageConsumer>,
    operator: Arc<WorkspaceOperator<S>>,
    queue_capacity: Option<usize>,
    state: watch::Sender<BridgeState>,
}

impl<S: WorkspaceStore + 'static> SettingsBridge<S> {
    pub fn new(consumer: Box<dyn MessageConsumer>, operator: Arc<WorkspaceOperator<S>>) -> Self {
        let (state, _) = watch::channel(BridgeState::Idle);
        Self {
            consumer,
            operator,
            queue_capacity: None,
            state,
        }
    }

    /// Enable the bounded internal queue (see the type docs for the
    /// delivery semantics this trades away).
    pub fn with_queue(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Watch the bridge lifecycle; useful for tests and health checks.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    fn start_processor(
        &self,
        capacity: usize,
    ) -> (mpsc::Sender<WorkspaceSettings>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<WorkspaceSettings>(capacity);
        let operator = self.operator.clone();
        let handle = tokio::spawn(async move {
            while let Some(settings) = rx.recv().await {
                match operator.process_message(&settings).await {
                    Ok(()) => info!(workspace = %settings.name, "processed settings message"),
                    Err(e) => error!(
                        workspace = %settings.name,
                        error = %e,
                        "failed to process settings message"
                    ),
                }
            }
        });
        (tx, handle)
    }

    async fn dispatch(&self, dispatch: &Dispatch, delivery: SettingsDelivery) {
        let settings = match serde_json::from_slice::<WorkspaceSettings>(delivery.payload()) {
            Ok(settings) => settings,
            Err(e) => {
                // Permanently invalid; a retry cannot make it decode.
                error!(error = %e, "failed to decode settings message");
                delivery.nack().await;
                return;
            }
        };

        match dispatch {
            Dispatch::Inline => match self.operator.process_message(&settings).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack().await {
                        error!(workspace = %settings.name, error = %e, "failed to ack settings message");
                    }
                }
                Err(e) => {
                    error!(
                        workspace = %settings.name,
                        error = %e,
                        "failed to process settings message"
                    );
                    delivery.nack().await;
                }
            },
            Dispatch::Queued(tx) => match tx.try_send(settings) {
                Ok(()) => {
                    if let Err(e) = delivery.ack().await {
                        error!(error = %e, "failed to ack settings message");
                    }
                }
                Err(mpsc::error::TrySendError::Full(settings)) => {
                    warn!(workspace = %settings.name, "settings queue full; dropping message");
                    delivery.nack().await;
                }
                Err(mpsc::error::TrySendError::Closed(settings)) => {
                    error!(workspace = %settings.name, "settings processor stopped; dropping message");
                    delivery.nack().await;
                }
            },
        }
    }
}

#[async_trait::async_trait]
impl<S: WorkspaceStore + 'static> Service for SettingsBridge<S> {
    fn name(&self) -> &'static str {
        "settings-bridge"
    }

    async fn run(mut self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        self.state.send_replace(BridgeState::Running);
        info!("settings bridge started");

        let (dispatch, processor) = match self.queue_capacity {
            Some(capacity) => {
                let (tx, handle) = self.start_processor(capacity);
                (Dispatch::Queued(tx), Some(handle))
            }
            None => (Dispatch::Inline, None),
        };

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.consumer.receive() => received,
            };

            match received {
                Ok(Some(delivery)) => self.dispatch(&dispatch, delivery).await,
                Ok(None) => {
                    info!("settings subscription closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to receive settings message");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        self.state.send_replace(BridgeState::Stopping);

        // Drop the sender so the processor drains what was admitted and
        // exits.
        drop(dispatch);
        if let Some(handle) = processor {
            if let Err(e) = handle.await {
                error!(error = %e, "settings processor panicked");
            }
        }

        self.consumer.close().await;
        self.state.send_replace(BridgeState::Stopped);
        info!("settings bridge stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::kernel::queue::{AckOutcome, TestConsumer};
    use crate::kernel::store::{StoreOp, TestWorkspaceStore};
    use tokio::sync::Semaphore;

    fn bridge_with_store(
        consumer: TestConsumer,
        store: Arc<TestWorkspaceStore>,
    ) -> SettingsBridge<TestWorkspaceStore> {
        let operator = Arc::new(WorkspaceOperator::new(store, test_config()));
        SettingsBridge::new(Box::new(consumer), operator)
    }

    fn creating_message(name: &str) -> serde_json::Value {
        serde_json::json!({"name": name, "status": "creating"})
    }

    async fn wait_for_state(
        rx: &mut watch::Receiver<BridgeState>,
        expected: BridgeState,
    ) {
        while *rx.borrow() != expected {
            rx.changed().await.expect("bridge state channel closed");
        }
    }

    #[tokio::test]
    async fn processes_and_acks_valid_messages() {
        let (consumer, handle) = TestConsumer::new();
        let store = Arc::new(TestWorkspaceStore::new());
        let bridge = bridge_with_store(consumer, store.clone());

        handle.push_json(&creating_message("geo-1"));
        handle.finish();

        Box::new(bridge)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(store.contains("geo-1"));
        assert_eq!(handle.outcomes(), vec![AckOutcome::Acked]);
        assert!(handle.was_closed());
    }

    #[tokio::test]
    async fn nacks_undecodable_payloads() {
        let (consumer, handle) = TestConsumer::new();
        let store = Arc::new(TestWorkspaceStore::new());
        let bridge = bridge_with_store(consumer, store.clone());

        handle.push("not json".as_bytes().to_vec());
        handle.finish();

        Box::new(bridge)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.outcomes(), vec![AckOutcome::Nacked]);
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn nacks_when_processing_fails() {
        let (consumer, handle) = TestConsumer::new();
        // Updating a workspace that does not exist is an error.
        let store = Arc::new(TestWorkspaceStore::new());
        let bridge = bridge_with_store(consumer, store.clone());

        handle.push_json(&serde_json::json!({"name": "ghost", "status": "updating"}));
        handle.finish();

        Box::new(bridge)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.outcomes(), vec![AckOutcome::Nacked]);
    }

    #[tokio::test]
    async fn acks_unknown_status_as_consumed() {
        let (consumer, handle) = TestConsumer::new();
        let store = Arc::new(TestWorkspaceStore::new());
        let bridge = bridge_with_store(consumer, store.clone());

        handle.push_json(&serde_json::json!({"name": "geo-1", "status": "archiving"}));
        handle.finish();

        Box::new(bridge)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.outcomes(), vec![AckOutcome::Acked]);
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn cancellation_moves_the_bridge_to_stopped() {
        let (consumer, _handle) = TestConsumer::new();
        let store = Arc::new(TestWorkspaceStore::new());
        let bridge = bridge_with_store(consumer, store);

        let mut state = bridge.state();
        assert_eq!(*state.borrow(), BridgeState::Idle);

        let shutdown = CancellationToken::new();
        let runner = tokio::spawn(Box::new(bridge).run(shutdown.clone()));

        wait_for_state(&mut state, BridgeState::Running).await;
        shutdown.cancel();
        wait_for_state(&mut state, BridgeState::Stopped).await;
        runner.await.unwrap().unwrap();
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn full_queue_drops_and_nacks_new_messages() {
        let (consumer, handle) = TestConsumer::new();
        // Zero permits: the processor parks inside the store on its
        // first message until we release it.
        let gate = Arc::new(Semaphore::new(0));
        let store = Arc::new(TestWorkspaceStore::gated(gate.clone()));
        let operator = Arc::new(WorkspaceOperator::new(store.clone(), test_config()));
        let bridge = SettingsBridge::new(Box::new(consumer), operator).with_queue(1);
        let mut state = bridge.state();

        let shutdown = CancellationToken::new();
        let runner = tokio::spawn(Box::new(bridge).run(shutdown.clone()));
        wait_for_state(&mut state, BridgeState::Running).await;

        // First message: admitted, dequeued by the processor, parked on
        // the gated store call. The op log records the read at entry.
        handle.push_json(&creating_message("ws-a"));
        wait_until(|| store.ops().contains(&StoreOp::Get("ws-a".to_string()))).await;

        // Second message: admitted into the now-empty queue slot.
        handle.push_json(&creating_message("ws-b"));
        wait_until(|| handle.acked_count() == 2).await;

        // Third message: queue full, dropped with a nack instead of
        // blocking the receive loop.
        handle.push_json(&creating_message("ws-c"));
        wait_until(|| handle.nacked_count() == 1).await;

        assert_eq!(handle.acked_count(), 2);
        assert_eq!(handle.nacked_count(), 1);

        // Release the store and let the bridge drain on shutdown.
        gate.add_permits(16);
        handle.finish();
        wait_for_state(&mut state, BridgeState::Stopped).await;
        runner.await.unwrap().unwrap();

        assert!(store.contains("ws-a"));
        assert!(store.contains("ws-b"));
        assert!(!store.contains("ws-c"));
    }
}
