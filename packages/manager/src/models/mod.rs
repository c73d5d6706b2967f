//! Data model: inbound settings, the Workspace CRD, and the outbound
//! status envelope.

pub mod settings;
pub mod status;
pub mod workspace;

pub use settings::{BlockStore, ObjectStore, SettingsStatus, Stores, WorkspaceSettings};
pub use status::StatusEnvelope;
pub use workspace::{
    AuthorizationSpec, AwsSpec, AwsStatus, EfsAccessPoint, EfsSpec, PersistentVolumeClaimSpec,
    PersistentVolumeSpec, PosixUser, S3Bucket, S3Spec, ServiceAccountSpec, StorageSpec,
    VolumeSource, Workspace, WorkspaceSpec, WorkspaceStatus,
};
