//! Coordinator context.
//!
//! Owns the interface, its neighbors, the timers and the notification layer.
//! Every entry point takes the current time and returns the I/O to perform,
//! so the whole protocol runs deterministically on a single task and can be
//! driven by a virtual clock in tests.

use crate::address::LocalAddress;
use crate::hello::HelloDrop;
use crate::interface::{Interface, IsmEffect};
use crate::neighbor::NeighborInfo;
use crate::notify::{ApcStatus, Notification, RoleNotifier, Sample};
use crate::packet::{HelloKind, HelloPacket};
use crate::proxy::ProxyCommand;
use crate::timer::{TimerKey, Timers};
use crate::types::{ApcConfig, ApcStats, InterfaceState, IsmEvent, Role, RouterId};
use bytes::Bytes;
use std::time::Instant;
use tracing::{debug, info};

/// I/O requested by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Broadcast a Hello payload
    Send(Bytes),
    /// Hand a command to the authentication proxy dispatcher
    Proxy(ProxyCommand),
    /// Publish a confirmed status
    Publish(ApcStatus),
}

/// The coordination context for one interface
#[derive(Debug)]
pub struct Coordinator {
    config: ApcConfig,
    interface: Interface,
    timers: Timers,
    notifier: RoleNotifier,
    stats: ApcStats,
}

impl Coordinator {
    pub fn new(config: ApcConfig, local: LocalAddress) -> Self {
        let interface = Interface::new(&config, local.ip, local.mac);
        let notifier = RoleNotifier::new(config.stability_cycles);
        Self {
            config,
            interface,
            timers: Timers::new(),
            notifier,
            stats: ApcStats::default(),
        }
    }

    pub fn config(&self) -> &ApcConfig {
        &self.config
    }

    pub fn router_id(&self) -> RouterId {
        self.interface.router_id
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    pub fn state(&self) -> InterfaceState {
        self.interface.state
    }

    /// Current, possibly unconfirmed, role
    pub fn role(&self) -> Option<Role> {
        self.interface.role()
    }

    pub fn stats(&self) -> &ApcStats {
        &self.stats
    }

    /// Last confirmed status
    pub fn status(&self) -> Option<ApcStatus> {
        self.notifier.status()
    }

    pub fn neighbors(&self, now: Instant) -> Vec<NeighborInfo> {
        self.interface.neighbor_infos(now)
    }

    /// Earliest time `handle_timers` has work to do
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Bring the interface up
    pub fn start(&mut self, now: Instant) -> Vec<Action> {
        info!(
            interface = %self.interface.name,
            router_id = %self.interface.router_id,
            priority = self.interface.priority,
            group_id = self.interface.group_id,
            "Starting APC election"
        );

        let mut actions = Vec::new();
        self.feed(IsmEvent::InterfaceUp, now, &mut actions);
        self.restart_heartbeat(now);
        actions
    }

    /// Link lost: neighbors are discarded until the link returns, and a
    /// confirmed DR or BDR gives up its role
    pub fn link_down(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.interface.state == InterfaceState::Loop {
            return actions;
        }

        info!(interface = %self.interface.name, "Link down");
        self.feed(IsmEvent::LoopInd, now, &mut actions);

        let before = self.notifier.status().map(|s| s.role);
        let notifications = self.notifier.reset();
        self.dispatch(notifications, now, &mut actions);
        if self.notifier.status().map(|s| s.role) != before {
            self.stats.role_changes += 1;
        }
        actions
    }

    /// Link restored: the interface comes back up from scratch
    pub fn link_up(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.interface.state != InterfaceState::Loop {
            return actions;
        }

        info!(interface = %self.interface.name, "Link up");
        self.feed(IsmEvent::UnloopInd, now, &mut actions);
        self.feed(IsmEvent::InterfaceUp, now, &mut actions);
        actions
    }

    /// Process one received datagram
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        if matches!(self.interface.state, InterfaceState::Down | InterfaceState::Loop) {
            debug!(state = %self.interface.state, "Hello ignored, interface not up");
            return actions;
        }

        let hello = match HelloPacket::parse(data) {
            Ok(hello) => hello,
            Err(e) => {
                self.stats.malformed += 1;
                debug!(error = %e, "Dropping malformed Hello");
                return actions;
            }
        };

        let outcome = match self.interface.receive_hello(&hello, now) {
            Ok(outcome) => outcome,
            Err(drop) => {
                match drop {
                    HelloDrop::OwnPacket => self.stats.own_hellos += 1,
                    HelloDrop::GroupMismatch { .. } => self.stats.group_mismatches += 1,
                    HelloDrop::IntervalMismatch { .. } => self.stats.interval_mismatches += 1,
                }
                debug!(router_id = %hello.router_id, reason = %drop, "Dropping Hello");
                return actions;
            }
        };

        self.stats.hellos_received += 1;
        if outcome.created {
            self.stats.neighbors_created += 1;
        }
        if outcome.replaced {
            self.stats.neighbors_replaced += 1;
        }

        if let Some(neighbor) = self.interface.neighbor(hello.router_id) {
            self.timers.start_oneshot(
                TimerKey::Inactivity(neighbor.router_id),
                neighbor.inactivity_deadline,
            );
        }

        for event in outcome.events {
            self.feed(event, now, &mut actions);
        }

        actions
    }

    /// Fire every timer due at `now`
    pub fn handle_timers(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();

        while let Some(key) = self.timers.pop_expired(now) {
            match key {
                TimerKey::Hello => {
                    self.send_hello(HelloKind::Hello, &mut actions);
                    self.sample(now, &mut actions);
                }
                TimerKey::Wait => self.feed(IsmEvent::WaitTimer, now, &mut actions),
                TimerKey::Heartbeat => {
                    debug!(status = ?self.notifier.status(), "Heartbeat");
                    let notifications = self.notifier.heartbeat();
                    self.dispatch(notifications, now, &mut actions);
                }
                TimerKey::Inactivity(router_id) => {
                    let known = self.interface.neighbor(router_id).is_some();
                    let event = self.interface.expire_neighbor(router_id, now);
                    if known && self.interface.neighbor(router_id).is_none() {
                        self.stats.neighbors_expired += 1;
                    }
                    if let Some(event) = event {
                        self.feed(event, now, &mut actions);
                    }
                }
            }
        }

        actions
    }

    /// Leave the segment: broadcast the shutdown Hello, stop the proxy if it
    /// runs here and take the interface down.
    pub fn shutdown(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.interface.state == InterfaceState::Down {
            return actions;
        }

        info!(interface = %self.interface.name, "Leaving segment");
        self.send_hello(HelloKind::Shutdown, &mut actions);

        let notifications = self.notifier.shutdown();
        if !notifications.is_empty() {
            self.dispatch(notifications, now, &mut actions);
            if let Some(status) = self.notifier.status() {
                actions.push(Action::Publish(status));
            }
        }

        self.feed(IsmEvent::InterfaceDown, now, &mut actions);
        self.timers.cancel_all();
        actions
    }

    /// Count a Hello the transport failed to send
    pub fn record_send_error(&mut self) {
        self.stats.send_errors += 1;
    }

    fn feed(&mut self, event: IsmEvent, now: Instant, actions: &mut Vec<Action>) {
        let effects = self.interface.handle_event(event);
        for effect in effects {
            self.apply(effect, now, actions);
        }
    }

    fn apply(&mut self, effect: IsmEffect, now: Instant, actions: &mut Vec<Action>) {
        match effect {
            IsmEffect::StartHelloTimer => {
                let period = self.config.hello_period();
                self.timers
                    .start_periodic(TimerKey::Hello, now + period, period);
            }
            IsmEffect::StopHelloTimer => {
                self.timers.cancel(TimerKey::Hello);
            }
            IsmEffect::StartWaitTimer => {
                self.timers
                    .start_oneshot(TimerKey::Wait, now + self.config.wait_period());
            }
            IsmEffect::CancelWaitTimer => {
                self.timers.cancel(TimerKey::Wait);
            }
            IsmEffect::SendHello => self.send_hello(HelloKind::Hello, actions),
            IsmEffect::NeighborsCleared(router_ids) => {
                for router_id in router_ids {
                    self.timers.cancel(TimerKey::Inactivity(router_id));
                }
            }
            IsmEffect::Elected(_) => {
                self.stats.elections += 1;
            }
        }
    }

    fn send_hello(&mut self, kind: HelloKind, actions: &mut Vec<Action>) {
        let hello = self.interface.build_hello(kind);
        debug!(
            kind = ?kind,
            neighbors = hello.neighbors.len(),
            "Sending Hello"
        );
        self.stats.hellos_sent += 1;
        actions.push(Action::Send(hello.to_bytes()));
    }

    /// Hello-cycle sample for the stability gate
    fn sample(&mut self, now: Instant, actions: &mut Vec<Action>) {
        let Some(role) = self.interface.role() else {
            return;
        };
        let sample = Sample {
            role,
            election: self.interface.election,
        };
        let before = self.notifier.status().map(|s| s.role);
        let notifications = self.notifier.on_cycle(sample, self.interface.membership());
        self.dispatch(notifications, now, actions);
        if self.notifier.status().map(|s| s.role) != before {
            self.stats.role_changes += 1;
        }
    }

    fn dispatch(&mut self, notifications: Vec<Notification>, now: Instant, actions: &mut Vec<Action>) {
        for notification in notifications {
            match notification {
                Notification::Proxy(command) => {
                    self.stats.proxy_commands += 1;
                    actions.push(Action::Proxy(command));
                }
                Notification::Publish(status) => {
                    self.restart_heartbeat(now);
                    actions.push(Action::Publish(status));
                }
            }
        }
    }

    fn restart_heartbeat(&mut self, now: Instant) {
        let period = self.config.heartbeat_interval;
        self.timers
            .start_periodic(TimerKey::Heartbeat, now + period, period);
    }
}
