//! Status notifier: hands every published status to local observers.

use crate::metrics::MetricsRegistry;
use apc::ApcStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Follows the node's status channel and publishes each new value
pub struct StatusNotifier {
    /// Status published by the node
    status_rx: watch::Receiver<Option<ApcStatus>>,

    /// JSON file replaced on every status
    state_file: Option<PathBuf>,

    metrics: Option<Arc<MetricsRegistry>>,
}

impl StatusNotifier {
    pub fn new(
        status_rx: watch::Receiver<Option<ApcStatus>>,
        state_file: Option<PathBuf>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            status_rx,
            state_file,
            metrics,
        }
    }

    /// Run until the node drops its status sender
    pub async fn run(mut self) {
        info!("Status notifier started");

        let mut last: Option<ApcStatus> = None;

        loop {
            let current = *self.status_rx.borrow_and_update();
            if let Some(status) = current {
                self.publish(&status, last.as_ref()).await;
                last = Some(status);
            }

            if self.status_rx.changed().await.is_err() {
                break;
            }
        }

        debug!("Status notifier stopped");
    }

    async fn publish(&self, status: &ApcStatus, last: Option<&ApcStatus>) {
        // Heartbeats republish an unchanged status
        if last != Some(status) {
            info!(
                role = %status.role,
                dr = ?status.dr_addr,
                bdr = ?status.bdr_addr,
                enabled = status.enabled,
                "APC status changed"
            );
        } else {
            debug!(role = %status.role, "APC status refreshed");
        }

        if let Some(ref m) = self.metrics {
            m.record_status(status);
        }

        if let Some(ref path) = self.state_file
            && let Err(e) = write_state_file(path, status).await
        {
            warn!(error = %e, path = %path.display(), "Failed to write state file");
        }
    }
}

/// Replace `path` with the JSON form of `status` in one rename
pub async fn write_state_file(path: &Path, status: &ApcStatus) -> common::Result<()> {
    let mut json = serde_json::to_vec_pretty(status)?;
    json.push(b'\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
