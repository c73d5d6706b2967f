//! Settings → workspace spec mapping.
//!
//! Everything here is pure: the same settings always produce the same
//! workspace object, which is what makes idempotent updates comparable
//! and the mapping testable without a store.

use std::collections::BTreeMap;

use crate::config::{Config, StorageSettings};
use crate::models::{
    AuthorizationSpec, AwsSpec, BlockStore, EfsAccessPoint, EfsSpec, ObjectStore,
    PersistentVolumeClaimSpec, PersistentVolumeSpec, PosixUser, S3Bucket, S3Spec,
    ServiceAccountSpec, StorageSpec, VolumeSource, Workspace, WorkspaceSettings, WorkspaceSpec,
};

/// Namespace the workspace CRs themselves are submitted to (distinct
/// from the per-workspace `ws-<name>` namespace each CR declares).
pub const WORKSPACE_NAMESPACE: &str = "workspaces";

const BUCKET_ENV_VAR: &str = "S3_BUCKET_WORKSPACE";
const DEFAULT_UID: i64 = 1000;
const DEFAULT_GID: i64 = 1000;
const DEFAULT_PERMISSIONS: &str = "755";

/// Build the workspace object a settings message declares.
pub fn build_workspace(settings: &WorkspaceSettings, config: &Config) -> Workspace {
    let mut buckets = Vec::new();
    let mut access_points = Vec::new();

    if let Some(stores) = &settings.stores {
        for store in stores {
            buckets.extend(map_object_stores(&settings.name, config, &store.object));
            access_points.extend(map_block_stores(&settings.name, config, &store.block));
        }
    }

    let storage = storage_for_access_points(&config.storage, &access_points);

    let spec = WorkspaceSpec {
        namespace: format!("ws-{}", settings.name),
        account: settings.account.to_string(),
        authorization: AuthorizationSpec {
            member_group: settings.member_group.clone(),
        },
        aws: AwsSpec {
            role_name: format!("{}-{}", config.aws.cluster, settings.name),
            efs: EfsSpec { access_points },
            s3: S3Spec { buckets },
        },
        service_account: ServiceAccountSpec {
            name: "default".to_string(),
        },
        storage,
    };

    let mut workspace = Workspace::new(&settings.name, spec);
    workspace.metadata.namespace = Some(WORKSPACE_NAMESPACE.to_string());
    workspace.metadata.labels = Some(BTreeMap::from([(
        "app.kubernetes.io/name".to_string(),
        "workspace-manager".to_string(),
    )]));
    workspace
}

/// One S3 bucket descriptor per object store entry.
pub fn map_object_stores(
    workspace_name: &str,
    config: &Config,
    object_stores: &[ObjectStore],
) -> Vec<S3Bucket> {
    object_stores
        .iter()
        .map(|object| S3Bucket {
            name: object.name.clone(),
            path: format!("{workspace_name}/"),
            env_var: BUCKET_ENV_VAR.to_string(),
            access_point_name: format!("{}-{}-s3", config.aws.cluster, workspace_name),
        })
        .collect()
}

/// One EFS access point per block store entry, rooted under the
/// workspace directory with fixed POSIX ownership.
pub fn map_block_stores(
    workspace_name: &str,
    config: &Config,
    block_stores: &[BlockStore],
) -> Vec<EfsAccessPoint> {
    block_stores
        .iter()
        .map(|block| EfsAccessPoint {
            name: block.name.clone(),
            fs_id: config.aws.fs_id.clone(),
            root_directory: format!("/workspaces/{workspace_name}"),
            user: PosixUser {
                uid: DEFAULT_UID,
                gid: DEFAULT_GID,
            },
            permissions: DEFAULT_PERMISSIONS.to_string(),
        })
        .collect()
}

/// One PV/PVC pair per access point, both named from the access point
/// so repeated builds land on the same objects.
pub fn storage_for_access_points(
    storage: &StorageSettings,
    access_points: &[EfsAccessPoint],
) -> StorageSpec {
    let persistent_volumes = access_points
        .iter()
        .map(|access_point| PersistentVolumeSpec {
            name: format!("pv-{}", access_point.name),
            storage_class: storage.storage_class.clone(),
            size: storage.size.clone(),
            volume_source: Some(VolumeSource {
                driver: storage.driver.clone(),
                access_point_name: access_point.name.clone(),
            }),
        })
        .collect();

    let persistent_volume_claims = access_points
        .iter()
        .map(|access_point| PersistentVolumeClaimSpec {
            name: format!("pvc-{}", access_point.name),
            storage_class: storage.storage_class.clone(),
            size: storage.size.clone(),
            pv_name: format!("pv-{}", access_point.name),
        })
        .collect();

    StorageSpec {
        persistent_volumes,
        persistent_volume_claims,
    }
}
