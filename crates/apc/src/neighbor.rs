//! Neighbor records and the neighbor state machine.

use crate::packet::HelloPacket;
use crate::types::{NeighborState, NsmEvent, RouterId};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A peer discovered on the segment
#[derive(Debug, Clone)]
pub struct Neighbor {
    /// Router ID (the peer's IPv4 address)
    pub router_id: RouterId,

    /// Basic MAC the peer presented when first heard
    pub mac: [u8; 6],

    /// Declared priority
    pub priority: u8,

    /// DR the peer declares
    pub dr: Option<RouterId>,

    /// BDR the peer declares
    pub bdr: Option<RouterId>,

    /// Visibility state
    pub state: NeighborState,

    /// When the peer is considered dead unless refreshed
    pub inactivity_deadline: Instant,
}

/// Result of feeding one event to the neighbor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: NeighborState,
    pub to: NeighborState,
}

impl Transition {
    /// Whether the neighbor entered or left 2-Way. Either direction changes
    /// the election's candidate set.
    pub fn crossed_two_way(&self) -> bool {
        (self.from < NeighborState::TwoWay) != (self.to < NeighborState::TwoWay)
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

impl Neighbor {
    /// Create a neighbor from its first Hello. The record starts in Down and
    /// expects a HelloReceived event right away.
    pub fn from_hello(hello: &HelloPacket, now: Instant) -> Self {
        Self {
            router_id: hello.router_id,
            mac: hello.mac,
            priority: hello.priority,
            dr: hello.declared_dr(),
            bdr: hello.declared_bdr(),
            state: NeighborState::Down,
            inactivity_deadline: now,
        }
    }

    /// Whether the peer currently declares itself DR
    pub fn declares_dr(&self) -> bool {
        self.dr == Some(self.router_id)
    }

    /// Whether the peer currently declares itself BDR
    pub fn declares_bdr(&self) -> bool {
        self.bdr == Some(self.router_id)
    }

    pub fn is_two_way(&self) -> bool {
        self.state == NeighborState::TwoWay
    }

    /// Run the neighbor state machine.
    ///
    /// HelloReceived refreshes the inactivity deadline to `now + dead`.
    /// InactivityTimer and KillNeighbor move to Down; the caller removes the
    /// record afterwards.
    pub fn handle_event(&mut self, event: NsmEvent, now: Instant, dead: Duration) -> Transition {
        let from = self.state;

        debug!(
            router_id = %self.router_id,
            state = %from,
            event = %event,
            "Neighbor state machine"
        );

        let to = match event {
            NsmEvent::HelloReceived => {
                self.inactivity_deadline = now + dead;
                from.max(NeighborState::OneWay)
            }
            NsmEvent::TwoWayReceived => NeighborState::TwoWay,
            NsmEvent::OneWayReceived => NeighborState::OneWay,
            NsmEvent::InactivityTimer | NsmEvent::KillNeighbor => NeighborState::Down,
        };

        if to != from {
            info!(
                router_id = %self.router_id,
                from = %from,
                to = %to,
                "Neighbor changed state"
            );
            self.state = to;
        }

        Transition { from, to }
    }

    /// Snapshot for observers
    pub fn info(&self, now: Instant) -> NeighborInfo {
        NeighborInfo {
            router_id: self.router_id,
            mac: format_mac(&self.mac),
            priority: self.priority,
            dr: self.dr,
            bdr: self.bdr,
            state: self.state,
            expires_in: self.inactivity_deadline.saturating_duration_since(now),
        }
    }
}

/// Read-only view of a neighbor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborInfo {
    pub router_id: RouterId,
    pub mac: String,
    pub priority: u8,
    pub dr: Option<RouterId>,
    pub bdr: Option<RouterId>,
    pub state: NeighborState,
    pub expires_in: Duration,
}

/// Colon-separated lowercase hex
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
