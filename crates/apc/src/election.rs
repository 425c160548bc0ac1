//! DR/BDR election.
//!
//! Two-pass broadcast-segment election (RFC 2328 section 9.4). The BDR is
//! chosen first, then the DR. A candidate that already declares itself DR
//! keeps the role against later, higher-priority arrivals; only when nobody
//! declares DR is the BDR promoted. If the first pass changes whether the
//! local node is DR or BDR, the local declaration is updated and both passes
//! run once more.
//!
//! Ties on priority go to the higher router ID.

use crate::types::{Role, RouterId};
use serde::{Deserialize, Serialize};

/// One participant as seen by the election: the local node or a 2-Way
/// neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub router_id: RouterId,
    pub priority: u8,
    /// DR this candidate currently declares
    pub dr: Option<RouterId>,
    /// BDR this candidate currently declares
    pub bdr: Option<RouterId>,
}

impl Candidate {
    fn declares_dr(&self) -> bool {
        self.dr == Some(self.router_id)
    }

    fn declares_bdr(&self) -> bool {
        self.bdr == Some(self.router_id)
    }

    fn is_eligible(&self) -> bool {
        self.priority > 0
    }

    fn rank(&self) -> (u8, RouterId) {
        (self.priority, self.router_id)
    }
}

/// Election outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Election {
    pub dr: Option<RouterId>,
    pub bdr: Option<RouterId>,
}

impl Election {
    /// Role of `router_id` under this outcome
    pub fn role_of(&self, router_id: RouterId) -> Role {
        if self.dr == Some(router_id) {
            Role::DR
        } else if self.bdr == Some(router_id) {
            Role::Backup
        } else {
            Role::DROther
        }
    }
}

/// Elect (DR, BDR) from the local node and its 2-Way neighbors.
///
/// `local.dr`/`local.bdr` must hold what the local node currently declares.
/// Ineligible (priority 0) entries, including the local node, are ignored.
pub fn elect(local: Candidate, peers: &[Candidate]) -> Election {
    let first = run_passes(&local, peers);

    let me = local.router_id;
    let dr_changed = local.declares_dr() != (first.dr == Some(me));
    let bdr_changed = local.declares_bdr() != (first.bdr == Some(me));
    if !dr_changed && !bdr_changed {
        return first;
    }

    let updated = Candidate {
        dr: first.dr,
        bdr: first.bdr,
        ..local
    };
    run_passes(&updated, peers)
}

fn run_passes(local: &Candidate, peers: &[Candidate]) -> Election {
    let candidates = || {
        std::iter::once(local)
            .chain(peers.iter())
            .filter(|c| c.is_eligible())
    };

    let bdr = elect_bdr(candidates());
    let dr = elect_dr(candidates()).or(bdr);

    Election { dr, bdr }
}

fn elect_bdr<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<RouterId> {
    let mut declared: Option<&Candidate> = None;
    let mut others: Option<&Candidate> = None;

    for c in candidates.filter(|c| !c.declares_dr()) {
        let slot = if c.declares_bdr() {
            &mut declared
        } else {
            &mut others
        };
        if slot.is_none_or(|best| c.rank() > best.rank()) {
            *slot = Some(c);
        }
    }

    declared.or(others).map(|c| c.router_id)
}

fn elect_dr<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<RouterId> {
    candidates
        .filter(|c| c.declares_dr())
        .max_by_key(|c| c.rank())
        .map(|c| c.router_id)
}
