//! Local address discovery.
//!
//! The router ID is the interface's IPv4 address, so nothing can start until
//! one is assigned, and a later change invalidates every peer's view of us.

use crate::types::RouterId;
use async_trait::async_trait;
use common::{Error, Result};
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Identity of the local node on the segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAddress {
    pub ip: RouterId,
    pub mac: [u8; 6],
}

/// Whether an address can serve as a router ID
pub fn is_usable(ip: RouterId) -> bool {
    !ip.is_unspecified() && !ip.is_link_local() && !ip.is_broadcast()
}

/// Where the local address comes from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Current usable address, or `None` if none is assigned yet
    async fn current(&self) -> Result<Option<LocalAddress>>;

    /// Whether the interface is up with carrier
    async fn link_up(&self) -> Result<bool>;
}

/// Reads the address and MAC of a network interface
#[derive(Debug, Clone)]
pub struct InterfaceAddressSource {
    interface: String,
}

impl InterfaceAddressSource {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    fn lookup(&self) -> Result<Option<LocalAddress>> {
        let addrs = getifaddrs().map_err(|e| Error::Io(e.into()))?;

        let mut ip = None;
        let mut mac = None;

        for ifaddr in addrs.filter(|a| a.interface_name == self.interface) {
            let Some(address) = ifaddr.address else {
                continue;
            };
            if let Some(inet) = address.as_sockaddr_in() {
                let candidate = inet.ip();
                if ip.is_none() && is_usable(candidate) {
                    ip = Some(candidate);
                }
            } else if let Some(link) = address.as_link_addr() {
                mac = mac.or(link.addr());
            }
        }

        Ok(ip.map(|ip| LocalAddress {
            ip,
            mac: mac.unwrap_or_default(),
        }))
    }

    fn carrier(&self) -> Result<bool> {
        let addrs = getifaddrs().map_err(|e| Error::Io(e.into()))?;
        let running = InterfaceFlags::IFF_UP | InterfaceFlags::IFF_RUNNING;

        Ok(addrs
            .filter(|a| a.interface_name == self.interface)
            .any(|a| a.flags.contains(running)))
    }
}

#[async_trait]
impl AddressSource for InterfaceAddressSource {
    async fn current(&self) -> Result<Option<LocalAddress>> {
        self.lookup()
    }

    async fn link_up(&self) -> Result<bool> {
        self.carrier()
    }
}

/// Poll `source` until it reports a usable address.
///
/// Cancel by dropping the future.
pub async fn wait_for_address(source: &dyn AddressSource, poll: Duration) -> LocalAddress {
    let mut announced = false;

    loop {
        match source.current().await {
            Ok(Some(local)) => {
                info!(address = %local.ip, "Local address available");
                return local;
            }
            Ok(None) => {
                if !announced {
                    info!("Waiting for a local address");
                    announced = true;
                }
            }
            Err(e) => warn!(error = %e, "Address lookup failed"),
        }
        tokio::time::sleep(poll).await;
    }
}

/// Resolve once the local address differs from `initial`.
///
/// A temporarily missing address is tolerated; a different one is not.
pub async fn watch_address(source: &dyn AddressSource, initial: LocalAddress, poll: Duration) -> Error {
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match source.current().await {
            Ok(Some(local)) if local.ip != initial.ip => {
                return Error::AddressChanged {
                    old: initial.ip,
                    new: local.ip,
                };
            }
            Ok(Some(_)) => {}
            Ok(None) => debug!(address = %initial.ip, "Local address missing"),
            Err(e) => warn!(error = %e, "Address lookup failed"),
        }
    }
}

/// Follow the interface's link state, publishing each change on `tx`.
///
/// Returns once every receiver is gone. A failed lookup keeps the last
/// known state.
pub async fn watch_link(source: &dyn AddressSource, poll: Duration, tx: watch::Sender<bool>) {
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if tx.is_closed() {
            return;
        }

        match source.link_up().await {
            Ok(up) => {
                tx.send_if_modified(|state| {
                    if *state == up {
                        return false;
                    }
                    info!(up, "Link state changed");
                    *state = up;
                    true
                });
            }
            Err(e) => warn!(error = %e, "Link state lookup failed"),
        }
    }
}
