//! Hello protocol engine.
//!
//! Builds the Hellos this node broadcasts and turns received Hellos into
//! neighbor and interface state machine events.

use crate::interface::Interface;
use crate::neighbor::Neighbor;
use crate::packet::{encode_declared, HelloKind, HelloPacket};
use crate::types::{IsmEvent, NsmEvent, RouterId};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Why a received Hello was discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HelloDrop {
    #[error("own Hello looped back")]
    OwnPacket,
    #[error("group ID {received} does not match {local}")]
    GroupMismatch { local: u32, received: u32 },
    #[error("intervals {hello}/{dead} do not match local configuration")]
    IntervalMismatch { hello: u16, dead: u32 },
}

/// What processing one accepted Hello did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelloOutcome {
    /// The sender was not known before
    pub created: bool,

    /// The sender's router ID was known under another MAC
    pub replaced: bool,

    /// Interface events to feed, in order, without duplicates
    pub events: Vec<IsmEvent>,
}

impl HelloOutcome {
    fn raise(&mut self, event: IsmEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }
}

impl Interface {
    /// Build the Hello to broadcast.
    ///
    /// A regular Hello lists every known neighbor whatever its state; that
    /// list is how peers detect mutual visibility.
    pub fn build_hello(&self, kind: HelloKind) -> HelloPacket {
        let mut hello = HelloPacket {
            mac: self.mac,
            group_id: self.group_id,
            router_id: self.router_id,
            hello_interval: self.hello_interval,
            options: 0,
            priority: self.priority,
            dead_interval: self.dead_interval,
            dr: encode_declared(self.election.dr),
            bdr: encode_declared(self.election.bdr),
            neighbors: Vec::new(),
        };

        match kind {
            HelloKind::Hello => {
                let mut ids: Vec<RouterId> = self.neighbors.keys().copied().collect();
                ids.sort();
                hello.neighbors = ids;
            }
            HelloKind::Shutdown => {
                hello.priority = 0;
                hello.dr = encode_declared(None);
                hello.bdr = encode_declared(None);
            }
        }

        hello
    }

    /// Process a decoded Hello.
    ///
    /// The neighbor's inactivity deadline is refreshed; re-arming the timer
    /// is up to the caller. Returned interface events have not been applied.
    pub fn receive_hello(
        &mut self,
        hello: &HelloPacket,
        now: Instant,
    ) -> Result<HelloOutcome, HelloDrop> {
        if hello.router_id == self.router_id {
            return Err(HelloDrop::OwnPacket);
        }
        if hello.group_id != self.group_id {
            return Err(HelloDrop::GroupMismatch {
                local: self.group_id,
                received: hello.group_id,
            });
        }
        if hello.hello_interval != self.hello_interval || hello.dead_interval != self.dead_interval
        {
            return Err(HelloDrop::IntervalMismatch {
                hello: hello.hello_interval,
                dead: hello.dead_interval,
            });
        }

        let mut outcome = HelloOutcome::default();
        let router_id = hello.router_id;

        if let Some(existing) = self.neighbors.get(&router_id)
            && existing.mac != hello.mac
        {
            info!(
                interface = %self.name,
                router_id = %router_id,
                "Neighbor MAC changed, replacing"
            );
            if let Some(event) = self.kill_neighbor(router_id, now) {
                outcome.raise(event);
            }
            outcome.replaced = true;
        }

        let dead = self.dead_period();
        let elected = self.state.is_elected();
        let waiting = self.state == crate::types::InterfaceState::Waiting;

        let neighbor = match self.neighbors.entry(router_id) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                info!(
                    interface = %self.name,
                    router_id = %router_id,
                    priority = hello.priority,
                    "New neighbor"
                );
                outcome.created = true;
                entry.insert(Neighbor::from_hello(hello, now))
            }
        };

        let was_two_way = neighbor.is_two_way();
        let previous = (neighbor.priority, neighbor.declares_dr(), neighbor.declares_bdr());

        neighbor.priority = hello.priority;
        neighbor.dr = hello.declared_dr();
        neighbor.bdr = hello.declared_bdr();

        neighbor.handle_event(NsmEvent::HelloReceived, now, dead);

        let visibility = if hello.lists(self.router_id) {
            NsmEvent::TwoWayReceived
        } else {
            NsmEvent::OneWayReceived
        };
        if neighbor
            .handle_event(visibility, now, dead)
            .crossed_two_way()
        {
            outcome.raise(IsmEvent::NeighborChange);
        }

        if waiting && ((neighbor.declares_dr() && neighbor.bdr.is_none()) || neighbor.declares_bdr())
        {
            debug!(interface = %self.name, router_id = %router_id, "Backup seen");
            outcome.raise(IsmEvent::BackupSeen);
        }

        let current = (neighbor.priority, neighbor.declares_dr(), neighbor.declares_bdr());
        if elected && was_two_way && neighbor.is_two_way() && current != previous {
            debug!(
                interface = %self.name,
                router_id = %router_id,
                "Neighbor priority or declaration changed"
            );
            outcome.raise(IsmEvent::NeighborChange);
        }

        Ok(outcome)
    }
}
