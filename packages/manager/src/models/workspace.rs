//! Workspace custom resource definition.
//!
//! The stored entity the bridge writes desired state into. The `status`
//! sub-resource is owned by the external workspace controller; this
//! service only ever reads it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a workspace: target namespace, authorization, AWS
/// resources, and the storage wiring derived from them.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workspaces.datahub.io",
    version = "v1alpha1",
    kind = "Workspace",
    plural = "workspaces",
    namespaced,
    status = "WorkspaceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Namespace the controller provisions for workspace resources
    /// (`ws-<name>`), distinct from the namespace the CR itself lives in.
    pub namespace: String,
    pub account: String,
    pub authorization: AuthorizationSpec,
    pub aws: AwsSpec,
    pub service_account: ServiceAccountSpec,
    pub storage: StorageSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationSpec {
    pub member_group: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsSpec {
    pub role_name: String,
    pub efs: EfsSpec,
    pub s3: S3Spec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EfsSpec {
    #[serde(default)]
    pub access_points: Vec<EfsAccessPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EfsAccessPoint {
    pub name: String,
    pub fs_id: String,
    pub root_directory: String,
    pub user: PosixUser,
    pub permissions: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PosixUser {
    pub uid: i64,
    pub gid: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Spec {
    #[serde(default)]
    pub buckets: Vec<S3Bucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Bucket {
    pub name: String,
    pub path: String,
    pub env_var: String,
    pub access_point_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    #[serde(default)]
    pub persistent_volumes: Vec<PersistentVolumeSpec>,
    #[serde(default)]
    pub persistent_volume_claims: Vec<PersistentVolumeClaimSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeSpec {
    pub name: String,
    pub storage_class: String,
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_source: Option<VolumeSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSource {
    pub driver: String,
    pub access_point_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    pub name: String,
    pub storage_class: String,
    pub size: String,
    pub pv_name: String,
}

/// Observed state written by the workspace controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_serializes_camel_case() {
        let spec = WorkspaceSpec {
            namespace: "ws-geo-1".to_string(),
            aws: AwsSpec {
                role_name: "eodh-geo-1".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["namespace"], "ws-geo-1");
        assert_eq!(json["aws"]["roleName"], "eodh-geo-1");
        assert_eq!(json["serviceAccount"]["name"], "");
    }

    #[test]
    fn status_equality_is_structural() {
        let a = WorkspaceStatus {
            state: Some("Running".to_string()),
            namespace: Some("ws-geo-1".to_string()),
            aws: None,
        };
        let b = a.clone();
        assert_eq!(a, b);

        let c = WorkspaceStatus {
            state: Some("Pending".to_string()),
            ..b.clone()
        };
        assert_ne!(b, c);
    }

    #[test]
    fn status_omits_unset_fields() {
        let status = WorkspaceStatus {
            state: Some("Pending".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"state":"Pending"}"#);
    }
}
