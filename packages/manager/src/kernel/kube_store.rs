//! Kubernetes-backed workspace store.
//!
//! CRUD goes through a namespaced `Api<Workspace>`; the subscription
//! adapts the cluster watch into `(old, new)` pairs by keeping the
//! last-seen object per name, mirroring what an informer's update
//! callback would deliver.

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::TryStreamExt;
use kube::api::{Api, DeleteParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::ResourceExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::Workspace;

use super::store::{StoreError, WorkspaceStore, WorkspaceSubscription};

pub struct KubeWorkspaceStore {
    api: Api<Workspace>,
}

impl KubeWorkspaceStore {
    /// Store scoped to the namespace the workspace CRs live in.
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

fn map_kube_error(name: &str, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(response) if response.code == 404 => {
            StoreError::NotFound(name.to_string())
        }
        kube::Error::Api(response) if response.code == 409 => {
            StoreError::Conflict(name.to_string())
        }
        other => StoreError::Api(anyhow!(other)),
    }
}

#[async_trait]
impl WorkspaceStore for KubeWorkspaceStore {
    async fn get(&self, name: &str) -> Result<Option<Workspace>, StoreError> {
        self.api
            .get_opt(name)
            .await
            .map_err(|e| map_kube_error(name, e))
    }

    async fn create(&self, workspace: Workspace) -> Result<(), StoreError> {
        let name = workspace.name_any();
        self.api
            .create(&PostParams::default(), &workspace)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(&name, e))
    }

    async fn update(&self, workspace: Workspace) -> Result<(), StoreError> {
        let name = workspace.name_any();
        self.api
            .replace(&name, &PostParams::default(), &workspace)
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(&name, e))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.api
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_kube_error(name, e))
    }

    async fn subscribe(&self) -> Result<WorkspaceSubscription, StoreError> {
        let api = self.api.clone();
        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let stream = watcher(api, watcher::Config::default()).default_backoff();
            let mut stream = std::pin::pin!(stream);
            // Last-seen object per name; a re-list after reconnect
            // reseeds this cache, changes during the gap are not
            // replayed.
            let mut last_seen: HashMap<String, Workspace> = HashMap::new();

            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = stream.try_next() => event,
                };

                match event {
                    Ok(Some(watcher::Event::Apply(workspace))) => {
                        let name = workspace.name_any();
                        if let Some(old) = last_seen.insert(name, workspace.clone()) {
                            if tx.send((old, workspace)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Some(watcher::Event::InitApply(workspace))) => {
                        last_seen.insert(workspace.name_any(), workspace);
                    }
                    Ok(Some(watcher::Event::Delete(workspace))) => {
                        last_seen.remove(&workspace.name_any());
                    }
                    Ok(Some(watcher::Event::Init | watcher::Event::InitDone)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "workspace watch error");
                    }
                }
            }
            debug!("workspace watch stopped");
        });

        Ok(WorkspaceSubscription::new(rx, cancel))
    }
}
