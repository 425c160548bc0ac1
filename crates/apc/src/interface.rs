//! The local interface, its neighbor table and the interface state machine.

use crate::election::{self, Candidate, Election};
use crate::neighbor::{Neighbor, NeighborInfo};
use crate::types::{ApcConfig, InterfaceState, IsmEvent, NsmEvent, Role, RouterId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Side effects requested by the interface state machine. The owner of the
/// timers and the transport carries them out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsmEffect {
    /// Start the periodic Hello timer
    StartHelloTimer,
    /// Stop the periodic Hello timer
    StopHelloTimer,
    /// Arm the one-shot Wait timer
    StartWaitTimer,
    /// Cancel a pending Wait timer
    CancelWaitTimer,
    /// Broadcast a Hello now
    SendHello,
    /// These neighbors were discarded; their inactivity timers must go
    NeighborsCleared(Vec<RouterId>),
    /// An election ran
    Elected(ElectionRun),
}

/// One election run and what it did to the interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionRun {
    pub previous: Election,
    pub current: Election,
    pub state: InterfaceState,
}

/// The coordination interface. Owns every neighbor heard on it.
#[derive(Debug)]
pub struct Interface {
    /// Network interface name
    pub name: String,

    /// Local router ID (own IPv4 address)
    pub router_id: RouterId,

    /// Local basic MAC
    pub mac: [u8; 6],

    /// Administrative group
    pub group_id: u32,

    /// Local priority
    pub priority: u8,

    /// Seconds between Hellos
    pub hello_interval: u16,

    /// Seconds before a silent neighbor is dropped
    pub dead_interval: u32,

    /// Seconds to wait before the first election
    pub wait_interval: u32,

    /// DR/BDR this node currently declares
    pub election: Election,

    /// Interface state
    pub state: InterfaceState,

    pub(crate) neighbors: HashMap<RouterId, Neighbor>,
}

impl Interface {
    pub fn new(config: &ApcConfig, router_id: RouterId, mac: [u8; 6]) -> Self {
        Self {
            name: config.interface.clone(),
            router_id,
            mac,
            group_id: config.group_id,
            priority: config.priority,
            hello_interval: config.hello_interval,
            dead_interval: config.dead_interval,
            wait_interval: config.wait_interval,
            election: Election::default(),
            state: InterfaceState::Down,
            neighbors: HashMap::new(),
        }
    }

    pub fn dead_period(&self) -> Duration {
        Duration::from_secs(self.dead_interval as u64)
    }

    pub fn neighbor(&self, router_id: RouterId) -> Option<&Neighbor> {
        self.neighbors.get(&router_id)
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &Neighbor> {
        self.neighbors.values()
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Neighbor snapshots ordered by router ID
    pub fn neighbor_infos(&self, now: Instant) -> Vec<NeighborInfo> {
        let mut infos: Vec<_> = self.neighbors.values().map(|n| n.info(now)).collect();
        infos.sort_by_key(|info| info.router_id);
        infos
    }

    /// The local node's role, if an election has run
    pub fn role(&self) -> Option<Role> {
        Role::from_state(self.state)
    }

    /// Router IDs taking part on the segment: this node plus every 2-Way
    /// neighbor, sorted.
    pub fn membership(&self) -> Vec<RouterId> {
        let mut members: Vec<RouterId> = std::iter::once(self.router_id)
            .chain(
                self.neighbors
                    .values()
                    .filter(|n| n.is_two_way())
                    .map(|n| n.router_id),
            )
            .collect();
        members.sort();
        members
    }

    /// Run the interface state machine
    pub fn handle_event(&mut self, event: IsmEvent) -> Vec<IsmEffect> {
        debug!(
            interface = %self.name,
            state = %self.state,
            event = %event,
            "Interface state machine"
        );

        let mut effects = Vec::new();

        match (self.state, event) {
            (InterfaceState::Down, IsmEvent::InterfaceUp) => {
                effects.push(IsmEffect::StartHelloTimer);
                if self.priority == 0 {
                    self.change_state(InterfaceState::DROther);
                } else {
                    self.change_state(InterfaceState::Waiting);
                    effects.push(IsmEffect::StartWaitTimer);
                }
                effects.push(IsmEffect::SendHello);
            }

            (InterfaceState::Waiting, IsmEvent::WaitTimer) => {
                effects.push(IsmEffect::Elected(self.run_election()));
            }

            (InterfaceState::Waiting, IsmEvent::BackupSeen) => {
                effects.push(IsmEffect::CancelWaitTimer);
                effects.push(IsmEffect::Elected(self.run_election()));
            }

            (state, IsmEvent::NeighborChange) if state.is_elected() => {
                effects.push(IsmEffect::Elected(self.run_election()));
            }

            (_, IsmEvent::LoopInd) => {
                self.teardown(&mut effects);
                self.change_state(InterfaceState::Loop);
            }

            (InterfaceState::Loop, IsmEvent::UnloopInd) => {
                self.change_state(InterfaceState::Down);
            }

            (_, IsmEvent::InterfaceDown) => {
                self.teardown(&mut effects);
                self.change_state(InterfaceState::Down);
            }

            (state, event) => {
                debug!(interface = %self.name, state = %state, event = %event, "Event ignored");
            }
        }

        effects
    }

    fn teardown(&mut self, effects: &mut Vec<IsmEffect>) {
        effects.push(IsmEffect::StopHelloTimer);
        effects.push(IsmEffect::CancelWaitTimer);

        let cleared = self.clear_neighbors();
        if !cleared.is_empty() {
            effects.push(IsmEffect::NeighborsCleared(cleared));
        }
        self.election = Election::default();
    }

    fn change_state(&mut self, state: InterfaceState) {
        if self.state == state {
            return;
        }
        info!(
            interface = %self.name,
            from = %self.state,
            to = %state,
            "Interface changed state"
        );
        self.state = state;
    }

    /// Elect DR/BDR from this node and its 2-Way neighbors, then move to the
    /// state matching our own role.
    pub fn run_election(&mut self) -> ElectionRun {
        let local = Candidate {
            router_id: self.router_id,
            priority: self.priority,
            dr: self.election.dr,
            bdr: self.election.bdr,
        };
        let peers: Vec<Candidate> = self
            .neighbors
            .values()
            .filter(|n| n.is_two_way())
            .map(|n| Candidate {
                router_id: n.router_id,
                priority: n.priority,
                dr: n.dr,
                bdr: n.bdr,
            })
            .collect();

        let previous = self.election;
        let current = election::elect(local, &peers);
        self.election = current;

        debug!(
            interface = %self.name,
            candidates = peers.len() + 1,
            dr = ?current.dr,
            bdr = ?current.bdr,
            "Election complete"
        );

        let state = match current.role_of(self.router_id) {
            Role::DR => InterfaceState::DR,
            Role::Backup => InterfaceState::Backup,
            Role::DROther => InterfaceState::DROther,
        };
        self.change_state(state);

        ElectionRun {
            previous,
            current,
            state,
        }
    }

    /// Inactivity expiry for one neighbor. Returns NeighborChange if the
    /// neighbor was a 2-Way election candidate.
    pub fn expire_neighbor(&mut self, router_id: RouterId, now: Instant) -> Option<IsmEvent> {
        let dead = self.dead_period();
        let neighbor = self.neighbors.get_mut(&router_id)?;

        // A refresh that raced the timer wins
        if neighbor.inactivity_deadline > now {
            return None;
        }

        let transition = neighbor.handle_event(NsmEvent::InactivityTimer, now, dead);
        self.neighbors.remove(&router_id);
        info!(interface = %self.name, router_id = %router_id, "Neighbor removed");

        transition
            .crossed_two_way()
            .then_some(IsmEvent::NeighborChange)
    }

    /// Kill a neighbor outright. Returns NeighborChange if it was 2-Way.
    pub(crate) fn kill_neighbor(&mut self, router_id: RouterId, now: Instant) -> Option<IsmEvent> {
        let dead = self.dead_period();
        let mut neighbor = self.neighbors.remove(&router_id)?;
        let transition = neighbor.handle_event(NsmEvent::KillNeighbor, now, dead);
        info!(interface = %self.name, router_id = %router_id, "Neighbor removed");

        transition
            .crossed_two_way()
            .then_some(IsmEvent::NeighborChange)
    }

    fn clear_neighbors(&mut self) -> Vec<RouterId> {
        let mut cleared: Vec<RouterId> = self.neighbors.keys().copied().collect();
        cleared.sort();
        if !cleared.is_empty() {
            info!(interface = %self.name, count = cleared.len(), "Discarding all neighbors");
        }
        self.neighbors.clear();
        cleared
    }
}
