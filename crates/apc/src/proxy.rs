//! Authentication proxy capability.
//!
//! The elected DR hosts the active authentication proxy for the segment.
//! The proxy itself is an external service; this module only defines how the
//! coordinator talks to it and runs those calls off the event loop.

use crate::types::RouterId;
use async_trait::async_trait;
use common::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default depth of the dispatcher queue
pub const DEFAULT_DISPATCH_QUEUE: usize = 16;

/// What the external service reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStatus {
    pub running: bool,
    #[serde(default)]
    pub membership: Vec<RouterId>,
}

/// Control interface of the external authentication proxy
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthProxy: Send + Sync {
    /// (Re)configure and start the proxy for the given members
    async fn start(&self, membership: Vec<RouterId>) -> Result<()>;

    /// Stop the proxy
    async fn stop(&self) -> Result<()>;

    /// Query the proxy
    async fn status(&self) -> Result<ProxyStatus>;
}

/// Instruction issued by the coordinator on a confirmed role change or heartbeat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyCommand {
    Enable { membership: Vec<RouterId> },
    Disable,
    /// Bring the service in line with the confirmed role: running with these
    /// members, or stopped when `None`
    Reconcile { membership: Option<Vec<RouterId>> },
}

/// Runs proxy commands in order on its own task
pub struct ProxyDispatcher {
    proxy: Arc<dyn AuthProxy>,
    rx: mpsc::Receiver<ProxyCommand>,
}

impl ProxyDispatcher {
    /// Create a dispatcher and the sender that feeds it
    pub fn new(proxy: Arc<dyn AuthProxy>, capacity: usize) -> (mpsc::Sender<ProxyCommand>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { proxy, rx })
    }

    /// Spawn the dispatcher on the current runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Execute commands until every sender is gone
    pub async fn run(mut self) {
        debug!("Proxy dispatcher started");

        while let Some(command) = self.rx.recv().await {
            let result = match &command {
                ProxyCommand::Enable { membership } => {
                    info!(members = membership.len(), "Starting authentication proxy");
                    self.proxy.start(membership.clone()).await
                }
                ProxyCommand::Disable => {
                    info!("Stopping authentication proxy");
                    self.proxy.stop().await
                }
                ProxyCommand::Reconcile { membership } => self.reconcile(membership.clone()).await,
            };

            // Repaired by the Reconcile issued with the next heartbeat
            if let Err(e) = result {
                warn!(error = %e, command = ?command, "Authentication proxy command failed");
            }
        }

        debug!("Proxy dispatcher stopped");
    }

    async fn reconcile(&self, membership: Option<Vec<RouterId>>) -> Result<()> {
        let status = self.proxy.status().await?;
        let mut reported = status.membership;
        reported.sort();

        match membership {
            Some(members) if !status.running || reported != members => {
                info!(
                    running = status.running,
                    members = members.len(),
                    "Authentication proxy out of step, restarting"
                );
                self.proxy.start(members).await
            }
            None if status.running => {
                info!("Authentication proxy still running, stopping");
                self.proxy.stop().await
            }
            _ => {
                debug!("Authentication proxy in step");
                Ok(())
            }
        }
    }
}
