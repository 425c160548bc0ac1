//! Stability gate and role notification.
//!
//! An election result only counts once it has been sampled identically for
//! a number of consecutive Hello cycles. Confirmed changes drive the
//! authentication proxy and the status channel.

use crate::election::Election;
use crate::proxy::ProxyCommand;
use crate::types::{Role, RouterId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Summary published to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApcStatus {
    pub role: Role,
    pub dr_addr: Option<RouterId>,
    pub bdr_addr: Option<RouterId>,
    /// Whether this node is meant to run the authentication proxy
    pub enabled: bool,
}

/// One per-cycle observation of the election
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub role: Role,
    pub election: Election,
}

/// Debounces election results
#[derive(Debug)]
pub struct StabilityGate {
    required: u32,
    pending: Option<(Sample, u32)>,
    confirmed: Option<Sample>,
}

impl StabilityGate {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            pending: None,
            confirmed: None,
        }
    }

    pub fn confirmed(&self) -> Option<Sample> {
        self.confirmed
    }

    /// Feed one sample. Returns the sample when it has just become confirmed.
    pub fn observe(&mut self, sample: Sample) -> Option<Sample> {
        if self.confirmed == Some(sample) {
            self.pending = None;
            return None;
        }

        let count = match self.pending {
            Some((pending, count)) if pending == sample => count + 1,
            _ => 1,
        };

        if count >= self.required {
            self.pending = None;
            self.confirmed = Some(sample);
            return Some(sample);
        }

        debug!(
            role = %sample.role,
            seen = count,
            required = self.required,
            "Election result not yet stable"
        );
        self.pending = Some((sample, count));
        None
    }
}

/// Outputs of the notification layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Proxy(ProxyCommand),
    Publish(ApcStatus),
}

/// Turns confirmed role changes into proxy commands and status updates
#[derive(Debug)]
pub struct RoleNotifier {
    gate: StabilityGate,
    status: Option<ApcStatus>,
    membership: Option<Vec<RouterId>>,
    /// A Disable has been issued since the proxy last ran here
    released: bool,
}

impl RoleNotifier {
    pub fn new(stability_cycles: u32) -> Self {
        Self {
            gate: StabilityGate::new(stability_cycles),
            status: None,
            membership: None,
            released: false,
        }
    }

    /// Last confirmed status
    pub fn status(&self) -> Option<ApcStatus> {
        self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_some_and(|s| s.enabled)
    }

    /// Process one Hello cycle's sample together with the current membership
    pub fn on_cycle(&mut self, sample: Sample, membership: Vec<RouterId>) -> Vec<Notification> {
        let mut out = Vec::new();

        match self.gate.observe(sample) {
            Some(confirmed) => self.apply(confirmed, membership, &mut out),
            None => {
                // Membership drifts while the role holds; keep the proxy current
                if self.gate.confirmed().map(|s| s.role) == Some(Role::DR) {
                    self.enable(membership, &mut out);
                }
            }
        }

        out
    }

    fn apply(&mut self, confirmed: Sample, membership: Vec<RouterId>, out: &mut Vec<Notification>) {
        let previous = self.status.map(|s| s.role);
        let mut enabled = self.is_enabled();

        if previous != Some(confirmed.role) {
            info!(
                from = ?previous,
                to = %confirmed.role,
                dr = ?confirmed.election.dr,
                bdr = ?confirmed.election.bdr,
                "Role confirmed"
            );
        }

        if confirmed.role == Role::DR {
            self.enable(membership, out);
            enabled = true;
        } else if matches!(previous, Some(Role::DR) | Some(Role::Backup)) {
            self.release(out);
            enabled = false;
        }

        let status = ApcStatus {
            role: confirmed.role,
            dr_addr: confirmed.election.dr,
            bdr_addr: confirmed.election.bdr,
            enabled,
        };
        self.status = Some(status);
        out.push(Notification::Publish(status));
    }

    fn enable(&mut self, membership: Vec<RouterId>, out: &mut Vec<Notification>) {
        if self.membership.as_ref() == Some(&membership) {
            return;
        }
        self.membership = Some(membership.clone());
        self.released = false;
        out.push(Notification::Proxy(ProxyCommand::Enable { membership }));
    }

    fn release(&mut self, out: &mut Vec<Notification>) {
        self.membership = None;
        self.released = true;
        out.push(Notification::Proxy(ProxyCommand::Disable));
    }

    /// Status to republish when the heartbeat fires, plus a check that the
    /// proxy still matches it. A failed or dropped command is retried here.
    pub fn heartbeat(&self) -> Vec<Notification> {
        let Some(status) = self.status else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(2);
        if status.enabled {
            out.push(Notification::Proxy(ProxyCommand::Reconcile {
                membership: self.membership.clone(),
            }));
        } else if self.released {
            out.push(Notification::Proxy(ProxyCommand::Reconcile { membership: None }));
        }
        out.push(Notification::Publish(status));
        out
    }

    /// Forget the confirmed result after the interface lost its link.
    /// A DR or BDR gives up the proxy and observers see an idle status.
    pub fn reset(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        let previous = self.status.map(|s| s.role);
        self.gate = StabilityGate::new(self.gate.required);

        if matches!(previous, Some(Role::DR) | Some(Role::Backup)) {
            info!(from = ?previous, "Link lost, giving up role");
            self.release(&mut out);
        }

        if self.status.is_some() {
            let idle = ApcStatus {
                role: Role::DROther,
                dr_addr: None,
                bdr_addr: None,
                enabled: false,
            };
            self.status = Some(idle);
            out.push(Notification::Publish(idle));
        }
        out
    }

    /// Commands needed to leave the segment cleanly
    pub fn shutdown(&mut self) -> Vec<Notification> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.release(&mut out);
        if let Some(status) = self.status.as_mut() {
            status.enabled = false;
        }
        out
    }
}
