//! APC election: distributed coordinator election for access points.
//!
//! Every access point on a broadcast segment runs this protocol. Together
//! they elect one active authentication-proxy coordinator (DR) and one hot
//! standby (BDR); everybody else stays idle. The election follows the
//! broadcast-segment DR/BDR election of OSPF (RFC 2328): Hellos discover
//! neighbors and establish 2-Way visibility, incumbents are not preempted,
//! and a confirmed result is only acted on once it has been stable for a few
//! Hello cycles.
//!
//! # Features
//!
//! - Hello wire codec on UDP port 50010
//! - Neighbor and interface state machines
//! - Two-pass DR/BDR election with router-ID tie-break
//! - Stability gate and authentication proxy control
//! - Graceful leave (priority 0 shutdown Hello)
//! - Link loss handling and periodic proxy reconciliation
//!
//! # Example
//!
//! ```no_run
//! use apc::{wait_for_address, watch_address, ApcConfig, ApcNode, ApcSocket, InterfaceAddressSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ApcConfig {
//!     interface: "br-wan".to_string(),
//!     priority: 10,
//!     ..Default::default()
//! };
//!
//! let source = InterfaceAddressSource::new(&config.interface);
//! let local = wait_for_address(&source, config.address_poll_interval).await;
//! let socket = ApcSocket::bind(&config)?;
//!
//! let poll = config.address_poll_interval;
//! let node = ApcNode::new(config, local, socket);
//! node.run(watch_address(&source, local, poll), async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod address;
mod coordinator;
mod election;
mod hello;
mod interface;
mod neighbor;
mod node;
mod notify;
mod packet;
mod proxy;
mod socket;
mod timer;
mod types;

pub use address::{
    is_usable, wait_for_address, watch_address, watch_link, AddressSource,
    InterfaceAddressSource, LocalAddress,
};
pub use coordinator::{Action, Coordinator};
pub use election::{elect, Candidate, Election};
pub use hello::{HelloDrop, HelloOutcome};
pub use interface::{ElectionRun, Interface, IsmEffect};
pub use neighbor::{format_mac, Neighbor, NeighborInfo};
pub use node::{ApcNode, Snapshot, SnapshotHandle};
pub use notify::{ApcStatus, Notification, RoleNotifier, Sample, StabilityGate};
pub use packet::{HelloKind, HelloPacket, PacketError, HELLO_HEADER_LEN, HELLO_MIN_LEN};
pub use proxy::{AuthProxy, ProxyCommand, ProxyDispatcher, ProxyStatus, DEFAULT_DISPATCH_QUEUE};
pub use socket::{interface_index, ApcSocket, Transport, MAX_HELLO_SIZE};
pub use timer::{TimerKey, Timers};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_types() {
        let config = ApcConfig::default();
        assert_eq!(config.port, APC_ELECTION_PORT);
        assert_eq!(config.priority, DEFAULT_PRIORITY);

        let state = InterfaceState::DROther;
        assert_eq!(state.to_string(), "DROther");
    }
}
