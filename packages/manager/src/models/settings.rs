//! Inbound workspace settings message.
//!
//! Produced by the upstream configuration system and consumed once per
//! delivery attempt by the settings bridge. The workspace name is the
//! unique key; everything else describes the desired state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Desired-state declaration for one workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub account: Uuid,
    #[serde(default)]
    pub member_group: String,
    pub status: SettingsStatus,
    #[serde(default)]
    pub stores: Option<Vec<Stores>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Lists of object and block stores associated with a workspace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stores {
    #[serde(default)]
    pub object: Vec<ObjectStore>,
    #[serde(default)]
    pub block: Vec<BlockStore>,
}

/// An object storage entry with related metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStore {
    #[serde(default)]
    pub store_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub env_var: String,
    #[serde(default)]
    pub access_point_arn: String,
}

/// A block storage entry with related metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockStore {
    #[serde(default)]
    pub store_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub access_point_id: String,
    #[serde(default)]
    pub mount_point: String,
}

/// Lifecycle action requested by a settings message.
///
/// Unrecognized values decode to `Unknown` with the raw string preserved,
/// so the operator can log them and drop the message as poison instead of
/// failing the decode and triggering redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsStatus {
    Creating,
    Updating,
    Deleting,
    Unknown(String),
}

impl Default for SettingsStatus {
    fn default() -> Self {
        SettingsStatus::Unknown(String::new())
    }
}

impl SettingsStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SettingsStatus::Creating => "creating",
            SettingsStatus::Updating => "updating",
            SettingsStatus::Deleting => "deleting",
            SettingsStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for SettingsStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "creating" => SettingsStatus::Creating,
            "updating" => SettingsStatus::Updating,
            "deleting" => SettingsStatus::Deleting,
            _ => SettingsStatus::Unknown(raw),
        }
    }
}

impl std::fmt::Display for SettingsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SettingsStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SettingsStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(SettingsStatus::from(String::deserialize(deserializer)?))
    }
}
