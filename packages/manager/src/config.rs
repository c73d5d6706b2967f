use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub nats_url: String,
    /// JetStream stream holding inbound settings messages.
    pub settings_stream: String,
    /// Durable consumer name on the settings stream.
    pub settings_consumer: String,
    /// Subject outbound status envelopes are published to.
    pub status_subject: String,
    /// Capacity of the bridge's internal queue. Unset means inline
    /// processing with per-message ack semantics.
    pub bridge_queue_capacity: Option<usize>,
    /// Upper bound on a single outbound status publish.
    pub publish_timeout: Duration,
    pub aws: AwsSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct AwsSettings {
    /// Cluster identifier used as a prefix for IAM role and access
    /// point names.
    pub cluster: String,
    pub fs_id: String,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub storage_class: String,
    pub size: String,
    pub driver: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            settings_stream: env::var("SETTINGS_STREAM")
                .unwrap_or_else(|_| "WORKSPACE_SETTINGS".to_string()),
            settings_consumer: env::var("SETTINGS_CONSUMER")
                .unwrap_or_else(|_| "workspace-manager".to_string()),
            status_subject: env::var("STATUS_SUBJECT")
                .unwrap_or_else(|_| "workspace.status".to_string()),
            bridge_queue_capacity: match env::var("BRIDGE_QUEUE_CAPACITY") {
                Ok(raw) => Some(
                    raw.parse()
                        .context("BRIDGE_QUEUE_CAPACITY must be a valid number")?,
                ),
                Err(_) => None,
            },
            publish_timeout: Duration::from_secs(
                env::var("STATUS_PUBLISH_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("STATUS_PUBLISH_TIMEOUT_SECS must be a valid number")?,
            ),
            aws: AwsSettings {
                cluster: env::var("CLUSTER_NAME").context("CLUSTER_NAME must be set")?,
                fs_id: env::var("EFS_FILESYSTEM_ID")
                    .context("EFS_FILESYSTEM_ID must be set")?,
            },
            storage: StorageSettings {
                storage_class: env::var("STORAGE_CLASS")
                    .unwrap_or_else(|_| "efs-sc".to_string()),
                size: env::var("STORAGE_SIZE").unwrap_or_else(|_| "10Gi".to_string()),
                driver: env::var("STORAGE_DRIVER")
                    .unwrap_or_else(|_| "efs.csi.aws.com".to_string()),
            },
        })
    }
}

/// Config fixture for unit tests that never touch the environment.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        nats_url: "nats://localhost:4222".to_string(),
        settings_stream: "WORKSPACE_SETTINGS".to_string(),
        settings_consumer: "workspace-manager".to_string(),
        status_subject: "workspace.status".to_string(),
        bridge_queue_capacity: None,
        publish_timeout: Duration::from_secs(5),
        aws: AwsSettings {
            cluster: "test-cluster".to_string(),
            fs_id: "fs-test".to_string(),
        },
        storage: StorageSettings {
            storage_class: "test-storage".to_string(),
            size: "10Gi".to_string(),
            driver: "efs.csi.aws.com".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_has_expected_defaults() {
        let config = test_config();
        assert_eq!(config.aws.cluster, "test-cluster");
        assert_eq!(config.storage.driver, "efs.csi.aws.com");
        assert!(config.bridge_queue_capacity.is_none());
    }
}
