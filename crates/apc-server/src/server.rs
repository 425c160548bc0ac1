//! APC daemon: wires the election node to its collaborators.

use crate::config::Config;
use crate::http_server::MetricsServer;
use crate::metrics::MetricsRegistry;
use crate::notifier::StatusNotifier;
use crate::proxy::UnixSocketAuthProxy;
use apc::{
    wait_for_address, watch_address, watch_link, ApcNode, ApcSocket, InterfaceAddressSource,
    ProxyDispatcher,
};
use common::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Time allowed for queued work to finish after the node stops
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// APC daemon
pub struct ApcServer {
    config: Config,
}

impl ApcServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until SIGINT/SIGTERM or a fatal error
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves or a fatal error
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let apc_config = self.config.to_apc_config();
        tokio::pin!(shutdown);

        info!(
            interface = %apc_config.interface,
            group_id = apc_config.group_id,
            priority = apc_config.priority,
            "Starting APC daemon"
        );

        let source = InterfaceAddressSource::new(&apc_config.interface);
        let poll = apc_config.address_poll_interval;

        let local = tokio::select! {
            local = wait_for_address(&source, poll) => local,
            _ = &mut shutdown => {
                info!("Shutdown requested before an address was assigned");
                return Ok(());
            }
        };

        let socket = ApcSocket::bind(&apc_config)?;
        let (link_tx, link_rx) = watch::channel(true);
        let mut node = ApcNode::new(apc_config, local, socket).with_link_state(link_rx);

        let mut background: Vec<JoinHandle<()>> = Vec::new();
        let link_source = source.clone();
        background.push(tokio::spawn(async move {
            watch_link(&link_source, poll, link_tx).await;
        }));

        let dispatcher_handle = if self.config.auth_proxy.enabled {
            let proxy = Arc::new(UnixSocketAuthProxy::new(
                &self.config.auth_proxy.socket,
                self.config.auth_proxy.timeout,
            ));
            info!(socket = %proxy.socket_path().display(), "Authentication proxy control enabled");
            let (tx, dispatcher) = ProxyDispatcher::new(proxy, self.config.auth_proxy.queue);
            node = node.with_proxy(tx);
            Some(dispatcher.spawn())
        } else {
            info!("Authentication proxy control disabled");
            None
        };

        let metrics = if self.config.metrics.enabled {
            info!("Metrics enabled on {}", self.config.metrics.listen_addr);
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let notifier = StatusNotifier::new(
            node.subscribe_status(),
            self.config.status.state_file.as_ref().map(PathBuf::from),
            metrics.clone(),
        );
        let notifier_handle = tokio::spawn(notifier.run());

        if let Some(ref registry) = metrics {
            let server = MetricsServer::new(
                registry.clone(),
                node.subscribe_status(),
                node.snapshots(),
                self.config.metrics.listen_addr.clone(),
            );
            background.push(tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    warn!(error = %e, "Metrics server error");
                }
            }));
        }

        let result = node
            .run(watch_address(&source, local, poll), &mut shutdown)
            .await;

        // The node is gone: its channels close and the dispatcher drains
        if let Some(handle) = dispatcher_handle {
            let grace = DRAIN_GRACE + self.config.auth_proxy.timeout;
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("Authentication proxy dispatcher did not drain in time");
            }
        }
        if tokio::time::timeout(DRAIN_GRACE, notifier_handle).await.is_err() {
            warn!("Status notifier did not finish in time");
        }
        for handle in background {
            handle.abort();
        }

        match &result {
            Ok(()) => info!("APC daemon stopped"),
            Err(e) => warn!(error = %e, "APC daemon stopped on error"),
        }
        result
    }
}

/// Resolves on SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
