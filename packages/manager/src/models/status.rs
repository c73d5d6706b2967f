//! Outbound status change notification.

use serde::{Deserialize, Serialize};

use super::workspace::WorkspaceStatus;

/// Payload published when a workspace's observed status changes.
///
/// Transient: built from the new object on each detected change and
/// never persisted by this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    pub workspace_name: String,
    pub namespace: String,
    pub status: WorkspaceStatus,
}
