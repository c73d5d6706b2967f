//! Workspace store abstraction.
//!
//! The declarative resource store is an external collaborator; this
//! trait covers exactly what the bridge consumes from it: keyed CRUD
//! plus a change-notification subscription. The production
//! implementation lives in [`super::kube_store`]; `TestWorkspaceStore`
//! backs the unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use kube::ResourceExt;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::models::Workspace;

/// Errors surfaced by workspace store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workspace {0} not found")]
    NotFound(String),
    /// Another writer changed the object since it was read; the caller
    /// converges by re-reading on redelivery.
    #[error("conflicting write for workspace {0}")]
    Conflict(String),
    #[error(transparent)]
    Api(#[from] anyhow::Error),
}

/// Cancellable handle over the store's change notifications, yielding
/// `(old, new)` pairs per workspace in per-object order.
pub struct WorkspaceSubscription {
    rx: mpsc::Receiver<(Workspace, Workspace)>,
    cancel: CancellationToken,
}

impl WorkspaceSubscription {
    pub fn new(rx: mpsc::Receiver<(Workspace, Workspace)>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Next observed change. `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<(Workspace, Workspace)> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WorkspaceSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Trait for the workspace resource store.
///
/// Implementations must support concurrent use: the settings bridge
/// writes while the status watcher's subscription reads.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Workspace>, StoreError>;

    async fn create(&self, workspace: Workspace) -> Result<(), StoreError>;

    /// Submit an update. The workspace must carry the concurrency token
    /// (resource version) read immediately beforehand; a mismatch is a
    /// [`StoreError::Conflict`].
    async fn update(&self, workspace: Workspace) -> Result<(), StoreError>;

    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Subscribe to `(old, new)` change pairs for all workspaces.
    async fn subscribe(&self) -> Result<WorkspaceSubscription, StoreError>;
}

/// A store operation observed by [`TestWorkspaceStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get(String),
    Create(String),
    Update(String),
    Delete(String),
}

impl StoreOp {
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreOp::Get(_))
    }
}

/// In-memory workspace store that records operations for testing.
///
/// Emulates the store's concurrency token: `create` stamps a resource
/// version, `update` rejects a stale one, and every successful update
/// feeds active subscriptions with the `(old, new)` pair.
#[derive(Default)]
pub struct TestWorkspaceStore {
    objects: RwLock<HashMap<String, Workspace>>,
    ops: Mutex<Vec<StoreOp>>,
    subscribers: Mutex<Vec<mpsc::Sender<(Workspace, Workspace)>>>,
    next_version: Mutex<u64>,
    /// When set, every operation consumes one permit first; tests use
    /// this to hold the operator mid-flight.
    gate: Option<std::sync::Arc<Semaphore>>,
}

impl TestWorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate every operation on `gate` permits.
    pub fn gated(gate: std::sync::Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Seed the store with an existing workspace, stamping a resource
    /// version if it has none.
    pub fn with_workspace(self, mut workspace: Workspace) -> Self {
        if workspace.metadata.resource_version.is_none() {
            workspace.metadata.resource_version = Some(self.bump_version());
        }
        let name = workspace.name_any();
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name, workspace);
        self
    }

    pub fn workspaces(&self) -> Vec<Workspace> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn workspace(&self, name: &str) -> Option<Workspace> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workspace(name).is_some()
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn write_count(&self) -> usize {
        self.ops().iter().filter(|op| op.is_write()).count()
    }

    fn record(&self, op: StoreOp) {
        self.ops.lock().unwrap_or_else(|e| e.into_inner()).push(op);
    }

    fn bump_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap_or_else(|e| e.into_inner());
        *version += 1;
        version.to_string()
    }

    async fn wait_for_gate(&self) {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn notify(&self, old: Workspace, new: Workspace) {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for tx in subscribers {
            let _ = tx.try_send((old.clone(), new.clone()));
        }
    }
}

#[async_trait]
impl WorkspaceStore for TestWorkspaceStore {
    async fn get(&self, name: &str) -> Result<Option<Workspace>, StoreError> {
        // Ops are recorded before the gate so tests can observe a
        // caller parked mid-operation.
        self.record(StoreOp::Get(name.to_string()));
        self.wait_for_gate().await;
        Ok(self.workspace(name))
    }

    async fn create(&self, mut workspace: Workspace) -> Result<(), StoreError> {
        let name = workspace.name_any();
        self.record(StoreOp::Create(name.clone()));
        self.wait_for_gate().await;

        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        if objects.contains_key(&name) {
            return Err(StoreError::Conflict(name));
        }
        workspace.metadata.resource_version = Some(self.bump_version());
        objects.insert(name, workspace);
        Ok(())
    }

    async fn update(&self, mut workspace: Workspace) -> Result<(), StoreError> {
        let name = workspace.name_any();
        self.record(StoreOp::Update(name.clone()));
        self.wait_for_gate().await;

        let old = {
            let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
            let existing = objects
                .get(&name)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(name.clone()))?;
            if existing.metadata.resource_version != workspace.metadata.resource_version {
                return Err(StoreError::Conflict(name));
            }
            workspace.metadata.resource_version = Some(self.bump_version());
            objects.insert(name, workspace.clone());
            existing
        };

        self.notify(old, workspace);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.record(StoreOp::Delete(name.to_string()));
        self.wait_for_gate().await;

        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn subscribe(&self) -> Result<WorkspaceSubscription, StoreError> {
        let (tx, rx) = mpsc::channel(32);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        Ok(WorkspaceSubscription::new(rx, CancellationToken::new()))
    }
}
