//! Outbound status change publisher.
//!
//! Watches `(old, new)` workspace pairs from the store subscription and
//! publishes an envelope for every real status transition. Redundant
//! notifications are suppressed by comparing the status structurally;
//! publish failures are logged and dropped — outbound delivery is
//! best-effort, single attempt.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::kernel::queue::QueuePublisher;
use crate::kernel::service_host::Service;
use crate::kernel::store::WorkspaceSubscription;
use crate::models::{StatusEnvelope, Workspace};

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StatusWatcher {
    subscription: WorkspaceSubscription,
    publisher: Arc<dyn QueuePublisher>,
    subject: String,
    publish_timeout: Duration,
}

impl StatusWatcher {
    pub fn new(
        subscription: WorkspaceSubscription,
        publisher: Arc<dyn QueuePublisher>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            subscription,
            publisher,
            subject: subject.into(),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    /// Handle one observed change. Must stay fast: it runs on the single
    /// dispatch path for the whole resource kind, so anything slow here
    /// delays every workspace's events, not just this one's.
    pub async fn handle_change(&self, old: &Workspace, new: &Workspace) {
        if old.status == new.status {
            debug!(workspace = %new.name_any(), "workspace status unchanged; skipping");
            return;
        }

        let envelope = StatusEnvelope {
            workspace_name: new.name_any(),
            namespace: new.namespace().unwrap_or_default(),
            status: new.status.clone().unwrap_or_default(),
        };

        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to serialize status update");
                return;
            }
        };

        match tokio::time::timeout(
            self.publish_timeout,
            self.publisher
                .publish(self.subject.clone(), payload.into()),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(workspace = %envelope.workspace_name, "published status update")
            }
            Ok(Err(e)) => {
                error!(
                    workspace = %envelope.workspace_name,
                    error = %e,
                    "failed to publish status update"
                )
            }
            Err(_) => {
                error!(
                    workspace = %envelope.workspace_name,
                    "timed out publishing status update"
                )
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for StatusWatcher {
    fn name(&self) -> &'static str {
        "status-watcher"
    }

    async fn run(mut self: Box<Self>, shutdown: CancellationToken) -> Result<()> {
        info!("status watcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = self.subscription.next() => match change {
                    Some((old, new)) => self.handle_change(&old, &new).await,
                    None => {
                        info!("workspace subscription closed");
                        break;
                    }
                }
            }
        }
        self.subscription.cancel();
        info!("status watcher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::queue::TestQueue;
    use crate::models::{WorkspaceSpec, WorkspaceStatus};
    use tokio::sync::mpsc;

    fn workspace(name: &str, status: Option<WorkspaceStatus>) -> Workspace {
        let mut ws = Workspace::new(name, WorkspaceSpec::default());
        ws.metadata.namespace = Some("workspaces".to_string());
        ws.status = status;
        ws
    }

    fn watcher_with_queue() -> (StatusWatcher, Arc<TestQueue>) {
        let (_tx, rx) = mpsc::channel(8);
        let subscription = WorkspaceSubscription::new(rx, CancellationToken::new());
        let queue = Arc::new(TestQueue::new());
        let watcher = StatusWatcher::new(subscription, queue.clone(), "workspace.status");
        (watcher, queue)
    }

    #[tokio::test]
    async fn identical_status_publishes_nothing() {
        let (watcher, queue) = watcher_with_queue();
        let status = Some(WorkspaceStatus {
            state: Some("Pending".to_string()),
            ..Default::default()
        });

        watcher
            .handle_change(&workspace("geo-1", status.clone()), &workspace("geo-1", status))
            .await;

        assert_eq!(queue.publish_count(), 0);
    }

    #[tokio::test]
    async fn changed_status_publishes_one_envelope() {
        let (watcher, queue) = watcher_with_queue();

        let old = workspace(
            "geo-1",
            Some(WorkspaceStatus {
                state: Some("Pending".to_string()),
                ..Default::default()
            }),
        );
        let new = workspace(
            "geo-1",
            Some(WorkspaceStatus {
                state: Some("Running".to_string()),
                namespace: Some("ws-geo-1".to_string()),
                ..Default::default()
            }),
        );

        watcher.handle_change(&old, &new).await;

        let messages = queue.messages_for_subject("workspace.status");
        assert_eq!(messages.len(), 1);

        let envelope: serde_json::Value = queue.deserialize_message(&messages[0]).unwrap();
        assert_eq!(envelope["workspaceName"], "geo-1");
        assert_eq!(envelope["namespace"], "workspaces");
        assert_eq!(envelope["status"]["state"], "Running");
        assert_eq!(envelope["status"]["namespace"], "ws-geo-1");
    }

    #[tokio::test]
    async fn first_status_counts_as_a_change() {
        let (watcher, queue) = watcher_with_queue();

        let old = workspace("geo-1", None);
        let new = workspace(
            "geo-1",
            Some(WorkspaceStatus {
                state: Some("Pending".to_string()),
                ..Default::default()
            }),
        );

        watcher.handle_change(&old, &new).await;
        assert_eq!(queue.publish_count(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_swallowed() {
        let (watcher, queue) = watcher_with_queue();
        queue.fail_publishes();

        let old = workspace("geo-1", None);
        let new = workspace(
            "geo-1",
            Some(WorkspaceStatus {
                state: Some("Pending".to_string()),
                ..Default::default()
            }),
        );

        // Errors are logged, never propagated.
        watcher.handle_change(&old, &new).await;
        assert_eq!(queue.publish_count(), 0);
    }

    #[tokio::test]
    async fn run_publishes_changes_until_cancelled() {
        let (tx, rx) = mpsc::channel(8);
        let subscription = WorkspaceSubscription::new(rx, CancellationToken::new());
        let queue = Arc::new(TestQueue::new());
        let watcher = StatusWatcher::new(subscription, queue.clone(), "workspace.status");

        let shutdown = CancellationToken::new();
        let runner = tokio::spawn(Box::new(watcher).run(shutdown.clone()));

        let old = workspace("geo-1", None);
        let new = workspace(
            "geo-1",
            Some(WorkspaceStatus {
                state: Some("Running".to_string()),
                ..Default::default()
            }),
        );
        tx.send((old, new)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while queue.publish_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        runner.await.unwrap().unwrap();
        assert_eq!(queue.publish_count(), 1);
    }
}
