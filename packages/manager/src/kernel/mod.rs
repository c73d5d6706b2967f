//! Kernel module - infrastructure seams shared by both bridge directions.

pub mod kube_store;
pub mod nats;
pub mod queue;
pub mod service_host;
pub mod store;

pub use kube_store::KubeWorkspaceStore;
pub use nats::{JetStreamConsumer, NatsPublisher};
pub use queue::{
    AckOutcome, Acker, MessageConsumer, PublishedMessage, QueuePublisher, SettingsDelivery,
    TestConsumer, TestConsumerHandle, TestQueue,
};
pub use service_host::{Service, ServiceHost};
pub use store::{StoreError, StoreOp, TestWorkspaceStore, WorkspaceStore, WorkspaceSubscription};
