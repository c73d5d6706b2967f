//! Long-running service lifecycle.
//!
//! A `Service` runs until its work is done or its cancellation token
//! fires; the `ServiceHost` owns the root token, fans out child tokens,
//! and joins everything on shutdown.
//!
//! # Example
//!
//! ```ignore
//! ServiceHost::new()
//!     .with_service(bridge)
//!     .with_service(watcher)
//!     .run_until_shutdown()
//!     .await?;
//! ```

use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A named long-running task with cooperative shutdown.
#[async_trait::async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    /// Run until completion or until `shutdown` is cancelled. In-flight
    /// work is allowed to finish; nothing is pre-empted.
    async fn run(self: Box<Self>, shutdown: CancellationToken) -> Result<()>;
}

/// Runs a set of services until a shutdown signal, then cancels and
/// joins them within a grace period.
pub struct ServiceHost {
    shutdown: CancellationToken,
    services: Vec<Box<dyn Service>>,
    grace_period: Duration,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            services: Vec::new(),
            grace_period: Duration::from_secs(30),
        }
    }

    pub fn with_service(mut self, service: impl Service + 'static) -> Self {
        self.services.push(Box::new(service));
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Token that triggers shutdown when cancelled; useful for driving
    /// the host from somewhere other than a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run all services until ctrl-c (or an external cancel), then stop.
    ///
    /// Returns once every service has stopped or the grace period has
    /// elapsed, whichever comes first.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let mut handles = Vec::with_capacity(self.services.len());
        for service in self.services {
            let name = service.name();
            let token = self.shutdown.child_token();
            handles.push(tokio::spawn(async move {
                info!(service = name, "service starting");
                match service.run(token).await {
                    Ok(()) => info!(service = name, "service stopped"),
                    Err(e) => error!(service = name, error = %e, "service exited with error"),
                }
            }));
        }

        let all_stopped = futures::future::join_all(handles);
        tokio::pin!(all_stopped);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                self.shutdown.cancel();
                if tokio::time::timeout(self.grace_period, &mut all_stopped)
                    .await
                    .is_err()
                {
                    warn!("services did not stop within the grace period");
                }
            }
            _ = self.shutdown.cancelled() => {
                if tokio::time::timeout(self.grace_period, &mut all_stopped)
                    .await
                    .is_err()
                {
                    warn!("services did not stop within the grace period");
                }
            }
            _ = &mut all_stopped => {
                info!("all services stopped");
            }
        }

        Ok(())
    }
}

impl Default for ServiceHost {
    fn default() -> Self {
        Self::new()
    }
}
