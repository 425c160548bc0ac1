//! Prometheus metrics for the APC daemon.
//!
//! The election loop keeps its own plain counters in [`ApcStats`]; the
//! registry mirrors them from each [`Snapshot`] by adding the difference
//! since the previous one.

use apc::{ApcStats, ApcStatus, InterfaceState, NeighborState, Role, Snapshot};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Mutex;

/// Labels for Hello traffic
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DirectionLabels {
    /// sent, received
    pub direction: String,
}

/// Labels for dropped Hellos
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DropLabels {
    /// group_mismatch, interval_mismatch, malformed, own
    pub reason: String,
}

/// Labels for neighbor table events
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NeighborEventLabels {
    /// created, expired, replaced
    pub event: String,
}

/// Labels for state-based gauges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StateLabels {
    pub state: String,
}

/// Labels for role-based metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RoleLabels {
    /// DR, BDR, OR
    pub role: String,
}

/// Metrics registry with all APC daemon metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    hellos_total: Family<DirectionLabels, Counter>,
    hellos_dropped_total: Family<DropLabels, Counter>,
    send_errors_total: Counter,
    elections_total: Counter,
    role_changes_total: Counter,
    proxy_commands_total: Counter,
    neighbor_events_total: Family<NeighborEventLabels, Counter>,

    neighbors: Family<StateLabels, Gauge>,
    interface_state: Family<StateLabels, Gauge>,
    role: Family<RoleLabels, Gauge>,
    proxy_enabled: Gauge,
    status_published_total: Family<RoleLabels, Counter>,

    /// Counters as of the last snapshot
    last: Mutex<ApcStats>,
}

const ROLES: [Role; 3] = [Role::DR, Role::Backup, Role::DROther];

const INTERFACE_STATES: [InterfaceState; 7] = [
    InterfaceState::Down,
    InterfaceState::Loop,
    InterfaceState::Waiting,
    InterfaceState::PtP,
    InterfaceState::DROther,
    InterfaceState::Backup,
    InterfaceState::DR,
];

const NEIGHBOR_STATES: [NeighborState; 3] = [
    NeighborState::Down,
    NeighborState::OneWay,
    NeighborState::TwoWay,
];

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let hellos_total = Family::<DirectionLabels, Counter>::default();
        registry.register(
            "apc_hellos",
            "Hello packets by direction",
            hellos_total.clone(),
        );

        let hellos_dropped_total = Family::<DropLabels, Counter>::default();
        registry.register(
            "apc_hellos_dropped",
            "Received packets dropped before processing",
            hellos_dropped_total.clone(),
        );

        let send_errors_total = Counter::default();
        registry.register(
            "apc_send_errors",
            "Failed Hello transmissions",
            send_errors_total.clone(),
        );

        let elections_total = Counter::default();
        registry.register(
            "apc_elections",
            "DR/BDR election runs",
            elections_total.clone(),
        );

        let role_changes_total = Counter::default();
        registry.register(
            "apc_role_changes",
            "Confirmed role changes",
            role_changes_total.clone(),
        );

        let proxy_commands_total = Counter::default();
        registry.register(
            "apc_proxy_commands",
            "Commands issued to the authentication proxy",
            proxy_commands_total.clone(),
        );

        let neighbor_events_total = Family::<NeighborEventLabels, Counter>::default();
        registry.register(
            "apc_neighbor_events",
            "Neighbor table changes",
            neighbor_events_total.clone(),
        );

        let neighbors = Family::<StateLabels, Gauge>::default();
        registry.register(
            "apc_neighbors",
            "Known neighbors by state",
            neighbors.clone(),
        );

        let interface_state = Family::<StateLabels, Gauge>::default();
        registry.register(
            "apc_interface_state",
            "Interface state machine state (1 = current)",
            interface_state.clone(),
        );

        let role = Family::<RoleLabels, Gauge>::default();
        registry.register(
            "apc_role",
            "Confirmed role (1 = current)",
            role.clone(),
        );

        let proxy_enabled = Gauge::default();
        registry.register(
            "apc_proxy_enabled",
            "Authentication proxy running on this node (1=yes, 0=no)",
            proxy_enabled.clone(),
        );

        let status_published_total = Family::<RoleLabels, Counter>::default();
        registry.register(
            "apc_status_published",
            "Status publications by role",
            status_published_total.clone(),
        );

        Self {
            registry,
            hellos_total,
            hellos_dropped_total,
            send_errors_total,
            elections_total,
            role_changes_total,
            proxy_commands_total,
            neighbor_events_total,
            neighbors,
            interface_state,
            role,
            proxy_enabled,
            status_published_total,
            last: Mutex::new(ApcStats::default()),
        }
    }

    /// Bring every metric up to date with a node snapshot
    pub fn update_from_snapshot(&self, snapshot: &Snapshot) {
        self.record_stats(&snapshot.stats);

        for state in NEIGHBOR_STATES {
            let count = snapshot
                .neighbors
                .iter()
                .filter(|n| n.state == state)
                .count();
            self.neighbors
                .get_or_create(&StateLabels {
                    state: state.to_string(),
                })
                .set(count as i64);
        }

        for state in INTERFACE_STATES {
            self.interface_state
                .get_or_create(&StateLabels {
                    state: state.to_string(),
                })
                .set((state == snapshot.state) as i64);
        }
    }

    /// Add what the counters gained since the last call
    pub fn record_stats(&self, stats: &ApcStats) {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let delta = |now: u64, before: u64| now.saturating_sub(before);

        self.hellos_total
            .get_or_create(&direction("sent"))
            .inc_by(delta(stats.hellos_sent, last.hellos_sent));
        self.hellos_total
            .get_or_create(&direction("received"))
            .inc_by(delta(stats.hellos_received, last.hellos_received));

        self.hellos_dropped_total
            .get_or_create(&reason("group_mismatch"))
            .inc_by(delta(stats.group_mismatches, last.group_mismatches));
        self.hellos_dropped_total
            .get_or_create(&reason("interval_mismatch"))
            .inc_by(delta(stats.interval_mismatches, last.interval_mismatches));
        self.hellos_dropped_total
            .get_or_create(&reason("malformed"))
            .inc_by(delta(stats.malformed, last.malformed));
        self.hellos_dropped_total
            .get_or_create(&reason("own"))
            .inc_by(delta(stats.own_hellos, last.own_hellos));

        self.send_errors_total
            .inc_by(delta(stats.send_errors, last.send_errors));
        self.elections_total
            .inc_by(delta(stats.elections, last.elections));
        self.role_changes_total
            .inc_by(delta(stats.role_changes, last.role_changes));
        self.proxy_commands_total
            .inc_by(delta(stats.proxy_commands, last.proxy_commands));

        self.neighbor_events_total
            .get_or_create(&neighbor_event("created"))
            .inc_by(delta(stats.neighbors_created, last.neighbors_created));
        self.neighbor_events_total
            .get_or_create(&neighbor_event("expired"))
            .inc_by(delta(stats.neighbors_expired, last.neighbors_expired));
        self.neighbor_events_total
            .get_or_create(&neighbor_event("replaced"))
            .inc_by(delta(stats.neighbors_replaced, last.neighbors_replaced));

        *last = stats.clone();
    }

    /// Record a published status
    pub fn record_status(&self, status: &ApcStatus) {
        for role in ROLES {
            self.role
                .get_or_create(&role_labels(role))
                .set((role == status.role) as i64);
        }
        self.proxy_enabled.set(status.enabled as i64);
        self.status_published_total
            .get_or_create(&role_labels(status.role))
            .inc();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn direction(direction: &str) -> DirectionLabels {
    DirectionLabels {
        direction: direction.to_string(),
    }
}

fn reason(reason: &str) -> DropLabels {
    DropLabels {
        reason: reason.to_string(),
    }
}

fn neighbor_event(event: &str) -> NeighborEventLabels {
    NeighborEventLabels {
        event: event.to_string(),
    }
}

fn role_labels(role: Role) -> RoleLabels {
    RoleLabels {
        role: role.to_string(),
    }
}
