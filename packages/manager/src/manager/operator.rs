//! Status-dispatched workspace operations.
//!
//! One settings message maps to at most one write against the store,
//! with idempotency rules that make at-least-once delivery safe:
//! re-created workspaces are tolerated, deletes of missing workspaces
//! succeed, and updates carry the concurrency token forward.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::config::Config;
use crate::kernel::store::{StoreError, WorkspaceStore};
use crate::models::{SettingsStatus, WorkspaceSettings};

use super::spec::build_workspace;

/// Applies settings messages to the workspace store.
pub struct WorkspaceOperator<S: WorkspaceStore> {
    store: Arc<S>,
    config: Config,
}

impl<S: WorkspaceStore> WorkspaceOperator<S> {
    pub fn new(store: Arc<S>, config: Config) -> Self {
        Self { store, config }
    }

    /// Process one settings message.
    ///
    /// An `Err` means the message is worth redelivering (transient store
    /// failure, missing update target, write conflict). Poison inputs
    /// return `Ok` so the bridge consumes them.
    pub async fn process_message(&self, settings: &WorkspaceSettings) -> Result<()> {
        match &settings.status {
            SettingsStatus::Creating => self.create(settings).await,
            SettingsStatus::Updating => self.update(settings).await,
            SettingsStatus::Deleting => self.delete(settings).await,
            SettingsStatus::Unknown(raw) => {
                error!(
                    workspace = %settings.name,
                    status = %raw,
                    "unknown status in settings message; dropping"
                );
                Ok(())
            }
        }
    }

    async fn create(&self, settings: &WorkspaceSettings) -> Result<()> {
        if self.store.get(&settings.name).await?.is_some() {
            info!(workspace = %settings.name, "workspace already exists");
            return Ok(());
        }

        let workspace = build_workspace(settings, &self.config);
        self.store.create(workspace).await?;
        info!(workspace = %settings.name, "workspace created");
        Ok(())
    }

    async fn update(&self, settings: &WorkspaceSettings) -> Result<()> {
        let existing = self
            .store
            .get(&settings.name)
            .await?
            .ok_or_else(|| StoreError::NotFound(settings.name.clone()))?;

        let mut workspace = build_workspace(settings, &self.config);
        // Carry the token read above so a concurrent external write
        // surfaces as a conflict instead of being overwritten.
        workspace.metadata.resource_version = existing.metadata.resource_version;

        self.store.update(workspace).await?;
        info!(workspace = %settings.name, "workspace updated");
        Ok(())
    }

    async fn delete(&self, settings: &WorkspaceSettings) -> Result<()> {
        if self.store.get(&settings.name).await?.is_none() {
            info!(workspace = %settings.name, "workspace does not exist; nothing to delete");
            return Ok(());
        }

        self.store.delete(&settings.name).await?;
        info!(workspace = %settings.name, "workspace deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::kernel::store::{StoreOp, TestWorkspaceStore};
    use crate::models::WorkspaceSpec;
    use crate::models::Workspace;

    fn operator(store: Arc<TestWorkspaceStore>) -> WorkspaceOperator<TestWorkspaceStore> {
        WorkspaceOperator::new(store, test_config())
    }

    fn settings(name: &str, status: SettingsStatus) -> WorkspaceSettings {
        WorkspaceSettings {
            name: name.to_string(),
            status,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_stores_the_workspace() {
        let store = Arc::new(TestWorkspaceStore::new());
        let operator = operator(store.clone());

        operator
            .process_message(&settings("geo-1", SettingsStatus::Creating))
            .await
            .unwrap();

        assert!(store.contains("geo-1"));
        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Get("geo-1".to_string()),
                StoreOp::Create("geo-1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn create_twice_issues_one_write() {
        let store = Arc::new(TestWorkspaceStore::new());
        let operator = operator(store.clone());
        let message = settings("geo-1", SettingsStatus::Creating);

        operator.process_message(&message).await.unwrap();
        operator.process_message(&message).await.unwrap();

        assert_eq!(store.workspaces().len(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn update_carries_the_read_token_forward() {
        let store = Arc::new(
            TestWorkspaceStore::new()
                .with_workspace(Workspace::new("geo-1", WorkspaceSpec::default())),
        );
        let before = store.workspace("geo-1").unwrap();
        let operator = operator(store.clone());

        let mut message = settings("geo-1", SettingsStatus::Updating);
        message.member_group = "new-group".to_string();
        operator.process_message(&message).await.unwrap();

        // TestWorkspaceStore rejects stale tokens, so a successful
        // update proves the freshly read version was carried.
        let after = store.workspace("geo-1").unwrap();
        assert_ne!(after.metadata.resource_version, before.metadata.resource_version);
        assert_eq!(after.spec.authorization.member_group, "new-group");
    }

    #[tokio::test]
    async fn update_of_missing_workspace_is_an_error() {
        let store = Arc::new(TestWorkspaceStore::new());
        let operator = operator(store.clone());

        let err = operator
            .process_message(&settings("ghost", SettingsStatus::Updating))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not found"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn delete_of_missing_workspace_succeeds() {
        let store = Arc::new(TestWorkspaceStore::new());
        let operator = operator(store.clone());

        operator
            .process_message(&settings("ghost", SettingsStatus::Deleting))
            .await
            .unwrap();

        assert_eq!(store.ops(), vec![StoreOp::Get("ghost".to_string())]);
    }

    #[tokio::test]
    async fn delete_removes_an_existing_workspace() {
        let store = Arc::new(
            TestWorkspaceStore::new()
                .with_workspace(Workspace::new("geo-1", WorkspaceSpec::default())),
        );
        let operator = operator(store.clone());

        operator
            .process_message(&settings("geo-1", SettingsStatus::Deleting))
            .await
            .unwrap();

        assert!(!store.contains("geo-1"));
    }

    #[tokio::test]
    async fn unknown_status_makes_no_store_calls() {
        let store = Arc::new(TestWorkspaceStore::new());
        let operator = operator(store.clone());

        operator
            .process_message(&settings("geo-1", SettingsStatus::Unknown("archiving".into())))
            .await
            .unwrap();

        assert!(store.ops().is_empty());
    }
}
