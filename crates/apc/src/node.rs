//! APC node event loop.
//!
//! A single task multiplexes inbound Hellos, the coordinator's next timer
//! deadline, link and address changes, snapshot requests and the shutdown
//! signal. Everything the coordinator asks for is carried out here; proxy
//! commands are only queued so that the loop never waits on the external
//! service.

use crate::address::LocalAddress;
use crate::coordinator::{Action, Coordinator};
use crate::election::Election;
use crate::neighbor::NeighborInfo;
use crate::notify::ApcStatus;
use crate::proxy::ProxyCommand;
use crate::socket::{Transport, MAX_HELLO_SIZE};
use crate::types::{ApcConfig, ApcStats, InterfaceState, RouterId};
use common::{Error, Result};
use serde::Serialize;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Point-in-time view of the node for observers
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub router_id: RouterId,
    pub state: InterfaceState,
    pub election: Election,
    pub stats: ApcStats,
    pub neighbors: Vec<NeighborInfo>,
}

/// Pending snapshot requests the node buffers
const SNAPSHOT_QUEUE: usize = 8;

/// Asks a running node for a [`Snapshot`]. The node builds one only when
/// asked.
#[derive(Debug, Clone)]
pub struct SnapshotHandle {
    tx: mpsc::Sender<oneshot::Sender<Snapshot>>,
}

impl SnapshotHandle {
    /// A handle and the request stream a node answers
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<oneshot::Sender<Snapshot>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Current snapshot; `None` once the node has stopped
    pub async fn get(&self) -> Option<Snapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(reply_tx).await.ok()?;
        reply_rx.await.ok()
    }
}

enum Event {
    Datagram(io::Result<(usize, SocketAddr)>),
    Timer,
    Link(bool),
    SnapshotRequest(oneshot::Sender<Snapshot>),
    AddressChanged(Error),
    Shutdown,
}

/// APC node: a coordinator bound to a transport
pub struct ApcNode<T: Transport> {
    coordinator: Coordinator,
    transport: T,
    proxy_tx: Option<mpsc::Sender<ProxyCommand>>,
    status_tx: watch::Sender<Option<ApcStatus>>,
    link_rx: Option<watch::Receiver<bool>>,
    snapshots: SnapshotHandle,
    snapshot_rx: mpsc::Receiver<oneshot::Sender<Snapshot>>,
}

impl<T: Transport> ApcNode<T> {
    pub fn new(config: ApcConfig, local: LocalAddress, transport: T) -> Self {
        let coordinator = Coordinator::new(config, local);
        let (status_tx, _) = watch::channel(None);
        let (snapshots, snapshot_rx) = SnapshotHandle::channel(SNAPSHOT_QUEUE);

        Self {
            coordinator,
            transport,
            proxy_tx: None,
            status_tx,
            link_rx: None,
            snapshots,
            snapshot_rx,
        }
    }

    /// Forward proxy commands to a dispatcher
    pub fn with_proxy(mut self, proxy_tx: mpsc::Sender<ProxyCommand>) -> Self {
        self.proxy_tx = Some(proxy_tx);
        self
    }

    /// Confirmed status; `None` until the first confirmation
    pub fn subscribe_status(&self) -> watch::Receiver<Option<ApcStatus>> {
        self.status_tx.subscribe()
    }

    /// Follow link state changes: `false` discards neighbors and gives up a
    /// confirmed role, `true` restarts the interface
    pub fn with_link_state(mut self, link_rx: watch::Receiver<bool>) -> Self {
        self.link_rx = Some(link_rx);
        self
    }

    /// State, counters and neighbors on request
    pub fn snapshots(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    /// Run until `shutdown` resolves or `address_watch` reports a change.
    ///
    /// Both exits broadcast the shutdown Hello and stop the proxy if it runs
    /// here. An address change is returned as an error.
    pub async fn run<A, S>(mut self, address_watch: A, shutdown: S) -> Result<()>
    where
        A: Future<Output = Error>,
        S: Future<Output = ()>,
    {
        tokio::pin!(address_watch);
        tokio::pin!(shutdown);

        let actions = self.coordinator.start(now());
        self.execute(actions).await;

        let mut buf = vec![0u8; MAX_HELLO_SIZE];

        loop {
            let deadline = self.coordinator.next_deadline();
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            let event = tokio::select! {
                result = self.transport.recv(&mut buf) => Event::Datagram(result),
                _ = timer => Event::Timer,
                up = next_link_state(&mut self.link_rx) => Event::Link(up),
                Some(reply) = self.snapshot_rx.recv() => Event::SnapshotRequest(reply),
                error = &mut address_watch => Event::AddressChanged(error),
                _ = &mut shutdown => Event::Shutdown,
            };

            let actions = match event {
                Event::Datagram(Ok((len, from))) => {
                    debug!(from = %from, len, "Datagram received");
                    self.coordinator.handle_datagram(&buf[..len], now())
                }
                Event::Datagram(Err(e)) => {
                    warn!(error = %e, "Receive failed");
                    Vec::new()
                }
                Event::Timer => self.coordinator.handle_timers(now()),
                Event::Link(true) => self.coordinator.link_up(now()),
                Event::Link(false) => self.coordinator.link_down(now()),
                Event::SnapshotRequest(reply) => {
                    // The requester may have given up
                    let _ = reply.send(snapshot(&self.coordinator));
                    continue;
                }
                Event::AddressChanged(error) => {
                    warn!(error = %error, "Local address changed, leaving segment");
                    self.leave().await;
                    return Err(error);
                }
                Event::Shutdown => {
                    info!("Shutdown requested");
                    self.leave().await;
                    return Ok(());
                }
            };

            self.execute(actions).await;
        }
    }

    async fn leave(&mut self) {
        let actions = self.coordinator.shutdown(now());
        self.execute(actions).await;
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Send(payload) => {
                    if let Err(e) = self.transport.send(&payload).await {
                        // Retried with the next Hello cycle
                        warn!(error = %e, "Failed to send Hello");
                        self.coordinator.record_send_error();
                    }
                }
                Action::Proxy(command) => self.queue_proxy(command),
                Action::Publish(status) => {
                    self.status_tx.send_replace(Some(status));
                }
            }
        }
    }

    fn queue_proxy(&self, command: ProxyCommand) {
        let Some(tx) = &self.proxy_tx else {
            debug!(command = ?command, "No authentication proxy attached");
            return;
        };
        if let Err(e) = tx.try_send(command) {
            warn!(error = %e, "Authentication proxy queue unavailable, command dropped");
        }
    }
}

/// Next link state; pending forever without a link watch
async fn next_link_state(link_rx: &mut Option<watch::Receiver<bool>>) -> bool {
    if let Some(rx) = link_rx
        && rx.changed().await.is_ok()
    {
        return *rx.borrow_and_update();
    }
    std::future::pending().await
}

fn now() -> std::time::Instant {
    Instant::now().into_std()
}

fn snapshot(coordinator: &Coordinator) -> Snapshot {
    let interface = coordinator.interface();
    Snapshot {
        router_id: interface.router_id,
        state: interface.state,
        election: interface.election,
        stats: coordinator.stats().clone(),
        neighbors: coordinator.neighbors(now()),
    }
}
