//! APC election data types and structures.
//!
//! The state and event vocabulary mirrors the broadcast-segment election of
//! RFC 2328 (sections 9 and 10), reduced to the states this protocol uses.

use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Router identity. Each node uses its own IPv4 address.
pub type RouterId = Ipv4Addr;

/// UDP port every node sends Hellos to and listens on.
pub const APC_ELECTION_PORT: u16 = 50010;

/// Default router priority (0 would make the node ineligible)
pub const DEFAULT_PRIORITY: u8 = 1;

/// Default Hello interval in seconds
pub const DEFAULT_HELLO_INTERVAL: u16 = 10;

/// A neighbor is declared dead after this many missed Hellos
pub const DEFAULT_DEAD_COUNT: u32 = 4;

/// The Wait timer defaults to this many Hello intervals
pub const DEFAULT_WAIT_COUNT: u32 = 4;

/// Consecutive identical Hello-cycle results needed before a role is confirmed
pub const DEFAULT_STABILITY_CYCLES: u32 = 3;

/// Default interval between status republications when nothing changed
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Default interval between local address checks
pub const DEFAULT_ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Interface state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceState {
    /// Not active
    Down,
    /// Interface without link
    Loop,
    /// Waiting for the Wait timer before the first election
    Waiting,
    /// Point-to-point operation (never entered on a broadcast segment)
    PtP,
    /// Elected, neither DR nor BDR
    DROther,
    /// Elected BDR (hot standby)
    Backup,
    /// Elected DR (active coordinator)
    DR,
}

impl InterfaceState {
    /// Whether an election has produced this state.
    pub fn is_elected(&self) -> bool {
        matches!(
            self,
            InterfaceState::DROther | InterfaceState::Backup | InterfaceState::DR
        )
    }
}

impl std::fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceState::Down => write!(f, "Down"),
            InterfaceState::Loop => write!(f, "Loop"),
            InterfaceState::Waiting => write!(f, "Waiting"),
            InterfaceState::PtP => write!(f, "PtP"),
            InterfaceState::DROther => write!(f, "DROther"),
            InterfaceState::Backup => write!(f, "Backup"),
            InterfaceState::DR => write!(f, "DR"),
        }
    }
}

/// Interface state machine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsmEvent {
    InterfaceUp,
    WaitTimer,
    BackupSeen,
    NeighborChange,
    LoopInd,
    UnloopInd,
    InterfaceDown,
}

impl std::fmt::Display for IsmEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IsmEvent::InterfaceUp => "InterfaceUp",
            IsmEvent::WaitTimer => "WaitTimer",
            IsmEvent::BackupSeen => "BackupSeen",
            IsmEvent::NeighborChange => "NeighborChange",
            IsmEvent::LoopInd => "LoopInd",
            IsmEvent::UnloopInd => "UnloopInd",
            IsmEvent::InterfaceDown => "InterfaceDown",
        };
        f.write_str(name)
    }
}

/// Neighbor visibility states, ordered by how far the relationship got
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NeighborState {
    Down,
    /// Heard from, but it does not list us yet
    OneWay,
    /// Mutual visibility; the only state eligible for election
    TwoWay,
}

impl std::fmt::Display for NeighborState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NeighborState::Down => write!(f, "Down"),
            NeighborState::OneWay => write!(f, "1-Way"),
            NeighborState::TwoWay => write!(f, "2-Way"),
        }
    }
}

/// Neighbor state machine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsmEvent {
    HelloReceived,
    TwoWayReceived,
    OneWayReceived,
    InactivityTimer,
    KillNeighbor,
}

impl std::fmt::Display for NsmEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NsmEvent::HelloReceived => "HelloReceived",
            NsmEvent::TwoWayReceived => "2-WayReceived",
            NsmEvent::OneWayReceived => "1-WayReceived",
            NsmEvent::InactivityTimer => "InactivityTimer",
            NsmEvent::KillNeighbor => "KillNbr",
        };
        f.write_str(name)
    }
}

/// The role this node plays on the segment, as published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Active coordinator
    #[serde(rename = "DR")]
    DR,
    /// Hot standby
    #[serde(rename = "BDR")]
    Backup,
    /// Idle
    #[serde(rename = "OR")]
    DROther,
}

impl Role {
    /// Classify an elected interface state. `None` for non-elected states.
    pub fn from_state(state: InterfaceState) -> Option<Role> {
        match state {
            InterfaceState::DR => Some(Role::DR),
            InterfaceState::Backup => Some(Role::Backup),
            InterfaceState::DROther => Some(Role::DROther),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::DR => write!(f, "DR"),
            Role::Backup => write!(f, "BDR"),
            Role::DROther => write!(f, "OR"),
        }
    }
}

/// APC protocol configuration
#[derive(Debug, Clone)]
pub struct ApcConfig {
    /// Network interface the segment is reached through
    pub interface: String,

    /// Administrative group; Hellos from other groups are ignored
    pub group_id: u32,

    /// Router priority (0 = never DR/BDR)
    pub priority: u8,

    /// Hello interval in seconds
    pub hello_interval: u16,

    /// Neighbor inactivity interval in seconds
    pub dead_interval: u32,

    /// Wait timer in seconds before the first election
    pub wait_interval: u32,

    /// UDP coordination port
    pub port: u16,

    /// Destination address for Hellos
    pub broadcast_addr: Ipv4Addr,

    /// Identical Hello-cycle results needed before acting on a new role
    pub stability_cycles: u32,

    /// Maximum silence on the status channel
    pub heartbeat_interval: Duration,

    /// How often the local address is re-checked
    pub address_poll_interval: Duration,
}

impl Default for ApcConfig {
    fn default() -> Self {
        Self {
            interface: String::from("br-wan"),
            group_id: 0,
            priority: DEFAULT_PRIORITY,
            hello_interval: DEFAULT_HELLO_INTERVAL,
            dead_interval: DEFAULT_DEAD_COUNT * DEFAULT_HELLO_INTERVAL as u32,
            wait_interval: DEFAULT_WAIT_COUNT * DEFAULT_HELLO_INTERVAL as u32,
            port: APC_ELECTION_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            stability_cycles: DEFAULT_STABILITY_CYCLES,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            address_poll_interval: DEFAULT_ADDRESS_POLL_INTERVAL,
        }
    }
}

impl ApcConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(Error::config("Interface name is required"));
        }

        if self.hello_interval == 0 {
            return Err(Error::config("Hello interval must be at least 1 second"));
        }

        if self.dead_interval <= self.hello_interval as u32 {
            return Err(Error::config(
                "Dead interval must be longer than the Hello interval",
            ));
        }

        if self.stability_cycles == 0 {
            return Err(Error::config("Stability cycles must be at least 1"));
        }

        if self.port == 0 {
            return Err(Error::config("Coordination port must be non-zero"));
        }

        Ok(())
    }

    /// Hello interval as a Duration
    pub fn hello_period(&self) -> Duration {
        Duration::from_secs(self.hello_interval as u64)
    }

    /// Dead interval as a Duration
    pub fn dead_period(&self) -> Duration {
        Duration::from_secs(self.dead_interval as u64)
    }

    /// Wait interval as a Duration
    pub fn wait_period(&self) -> Duration {
        Duration::from_secs(self.wait_interval as u64)
    }

    /// Whether this node may ever become DR or BDR
    pub fn is_eligible(&self) -> bool {
        self.priority > 0
    }
}

/// APC statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApcStats {
    /// Hellos broadcast (including the shutdown Hello)
    pub hellos_sent: u64,

    /// Hellos accepted for processing
    pub hellos_received: u64,

    /// Hellos from another group
    pub group_mismatches: u64,

    /// Hellos with different hello/dead intervals
    pub interval_mismatches: u64,

    /// Payloads that failed to decode
    pub malformed: u64,

    /// Our own broadcasts looped back
    pub own_hellos: u64,

    /// Failed Hello transmissions
    pub send_errors: u64,

    /// Election runs
    pub elections: u64,

    /// Confirmed role changes
    pub role_changes: u64,

    /// Neighbors created
    pub neighbors_created: u64,

    /// Neighbors removed by inactivity
    pub neighbors_expired: u64,

    /// Neighbors replaced after a MAC change
    pub neighbors_replaced: u64,

    /// Commands handed to the auth proxy dispatcher
    pub proxy_commands: u64,
}
