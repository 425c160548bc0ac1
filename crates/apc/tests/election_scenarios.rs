//! Multi-node election scenarios.
//!
//! Several coordinators share an in-memory broadcast segment and a virtual
//! clock that advances one second at a time.

use apc::{
    Action, ApcConfig, ApcStatus, Coordinator, HelloKind, HelloPacket, InterfaceState,
    LocalAddress, ProxyCommand, Role, RouterId,
};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

fn id(last: u8) -> RouterId {
    Ipv4Addr::new(10, 0, 0, last)
}

fn node(last: u8, priority: u8) -> Coordinator {
    let config = ApcConfig {
        interface: "test0".to_string(),
        group_id: 42,
        priority,
        ..Default::default()
    };
    Coordinator::new(
        config,
        LocalAddress {
            ip: id(last),
            mac: [2, 0, 0, 0, 0, last],
        },
    )
}

struct Segment {
    nodes: Vec<Coordinator>,
    up: Vec<bool>,
    now: Instant,
    published: Vec<Vec<ApcStatus>>,
    commands: Vec<Vec<ProxyCommand>>,
}

impl Segment {
    fn new(nodes: Vec<Coordinator>) -> Self {
        let n = nodes.len();
        Self {
            nodes,
            up: vec![false; n],
            now: Instant::now(),
            published: vec![Vec::new(); n],
            commands: vec![Vec::new(); n],
        }
    }

    fn start(&mut self, i: usize) {
        self.up[i] = true;
        let actions = self.nodes[i].start(self.now);
        self.run(i, actions);
    }

    /// Stop without a word
    fn crash(&mut self, i: usize) {
        self.up[i] = false;
    }

    /// Graceful leave
    fn leave(&mut self, i: usize) {
        let actions = self.nodes[i].shutdown(self.now);
        self.run(i, actions);
        self.up[i] = false;
    }

    fn run(&mut self, from: usize, actions: Vec<Action>) {
        let mut queue = VecDeque::from([(from, actions)]);

        while let Some((src, actions)) = queue.pop_front() {
            for action in actions {
                match action {
                    Action::Send(bytes) => {
                        for j in 0..self.nodes.len() {
                            if j != src && self.up[j] {
                                let out = self.nodes[j].handle_datagram(&bytes, self.now);
                                queue.push_back((j, out));
                            }
                        }
                    }
                    Action::Proxy(command) => self.commands[src].push(command),
                    Action::Publish(status) => self.published[src].push(status),
                }
            }
        }
    }

    fn advance(&mut self, secs: u64) {
        for _ in 0..secs {
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.now += Duration::from_secs(1);
        for i in 0..self.nodes.len() {
            if self.up[i] {
                let actions = self.nodes[i].handle_timers(self.now);
                self.run(i, actions);
            }
        }
    }

    /// Proxy commands issued on role or membership changes, without the
    /// periodic reconciliation
    fn role_commands(&self, i: usize) -> Vec<ProxyCommand> {
        self.commands[i]
            .iter()
            .filter(|c| !matches!(c, ProxyCommand::Reconcile { .. }))
            .cloned()
            .collect()
    }

    fn role(&self, i: usize) -> Option<Role> {
        self.nodes[i].status().map(|s| s.role)
    }
}

#[test]
fn scenario_a_simultaneous_boot() {
    let mut seg = Segment::new(vec![node(1, 10), node(2, 20)]);
    seg.start(0);
    seg.start(1);

    seg.advance(39);
    assert_eq!(seg.nodes[0].state(), InterfaceState::Waiting);
    assert_eq!(seg.nodes[1].state(), InterfaceState::Waiting);

    seg.advance(81);

    assert_eq!(seg.nodes[1].state(), InterfaceState::DR);
    assert_eq!(seg.nodes[0].state(), InterfaceState::Backup);

    let expected = ApcStatus {
        role: Role::DR,
        dr_addr: Some(id(2)),
        bdr_addr: Some(id(1)),
        enabled: true,
    };
    assert_eq!(seg.nodes[1].status(), Some(expected));
    assert_eq!(seg.role(0), Some(Role::Backup));

    assert_eq!(
        seg.role_commands(1),
        vec![ProxyCommand::Enable {
            membership: vec![id(1), id(2)]
        }]
    );
    assert!(seg.role_commands(0).is_empty());

    // Transient results never reached observers
    assert!(seg.published[0].iter().all(|s| s.role == Role::Backup));
}

#[test]
fn scenario_b_incumbent_keeps_dr_bdr_by_priority() {
    // A is the confirmed DR; B is 2-Way and has not declared itself BDR
    let mut a = node(1, 1);
    let mut now = Instant::now();
    a.start(now);
    for _ in 0..80 {
        now += Duration::from_secs(1);
        a.handle_timers(now);
    }
    assert_eq!(a.status().map(|s| s.role), Some(Role::DR));

    let hello = |last: u8, priority: u8, dr: RouterId| HelloPacket {
        mac: [2, 0, 0, 0, 0, last],
        group_id: 42,
        router_id: id(last),
        hello_interval: 10,
        options: 0,
        priority,
        dead_interval: 40,
        dr,
        bdr: Ipv4Addr::UNSPECIFIED,
        neighbors: vec![id(1)],
    };

    a.handle_datagram(&hello(2, 1, id(1)).to_bytes(), now);
    assert_eq!(a.interface().election.bdr, Some(id(2)));

    // C arrives with a much higher priority, fresh from boot
    a.handle_datagram(&hello(3, 100, Ipv4Addr::UNSPECIFIED).to_bytes(), now);

    assert_eq!(a.state(), InterfaceState::DR);
    assert_eq!(a.interface().election.dr, Some(id(1)));
    assert_eq!(a.interface().election.bdr, Some(id(3)));
}

#[test]
fn incumbent_dr_survives_higher_priority_arrival() {
    let mut seg = Segment::new(vec![node(1, 1), node(2, 1), node(3, 100)]);

    seg.start(0);
    seg.advance(80);
    assert_eq!(seg.role(0), Some(Role::DR));

    seg.start(1);
    seg.advance(60);
    assert_eq!(seg.role(1), Some(Role::Backup));

    seg.start(2);
    for _ in 0..100 {
        seg.tick();
        assert_eq!(seg.nodes[0].state(), InterfaceState::DR);
        assert_ne!(seg.nodes[2].state(), InterfaceState::DR);
    }

    assert_eq!(seg.role(0), Some(Role::DR));
    assert_eq!(seg.role(1), Some(Role::Backup));
    assert_eq!(seg.role(2), Some(Role::DROther));
    for node in &seg.nodes {
        assert_eq!(node.interface().election.dr, Some(id(1)));
    }

    // The DR keeps the proxy membership current as nodes join
    assert_eq!(
        seg.role_commands(0).last(),
        Some(&ProxyCommand::Enable {
            membership: vec![id(1), id(2), id(3)]
        })
    );
}

#[test]
fn scenario_c_dead_dr_replaced() {
    let mut seg = Segment::new(vec![node(1, 1), node(2, 1), node(3, 100)]);
    seg.start(0);
    seg.advance(80);
    seg.start(1);
    seg.advance(60);
    seg.start(2);
    seg.advance(60);
    assert_eq!(seg.role(0), Some(Role::DR));

    seg.crash(0);
    seg.advance(39);
    assert!(seg.nodes[1].interface().neighbor(id(1)).is_some());

    seg.advance(60);

    for i in [1, 2] {
        let node = &seg.nodes[i];
        assert!(node.interface().neighbor(id(1)).is_none());
        assert_eq!(node.stats().neighbors_expired, 1);
        assert_eq!(node.interface().election.dr, Some(id(2)));
        assert_eq!(node.interface().election.bdr, Some(id(3)));
    }
    assert_eq!(seg.role(1), Some(Role::DR));
    assert_eq!(seg.role(2), Some(Role::Backup));

    // Promoted from standby: the proxy starts with the surviving members
    assert_eq!(
        seg.role_commands(1).last(),
        Some(&ProxyCommand::Enable {
            membership: vec![id(2), id(3)]
        })
    );
}

#[test]
fn graceful_leave_triggers_immediate_reelection() {
    let mut seg = Segment::new(vec![node(1, 5), node(2, 1)]);
    seg.start(0);
    seg.advance(80);
    seg.start(1);
    seg.advance(60);
    assert_eq!(seg.role(0), Some(Role::DR));
    assert_eq!(seg.role(1), Some(Role::Backup));

    seg.leave(0);
    assert_eq!(seg.role_commands(0).last(), Some(&ProxyCommand::Disable));

    // No dead interval needed
    assert_eq!(seg.nodes[1].state(), InterfaceState::DR);
    assert_eq!(seg.nodes[1].interface().election.dr, Some(id(2)));

    seg.advance(30);
    assert_eq!(seg.role(1), Some(Role::DR));
}

#[test]
fn priority_zero_never_backup_or_dr() {
    let mut seg = Segment::new(vec![node(9, 0), node(1, 1), node(2, 1)]);
    for i in 0..3 {
        seg.start(i);
    }

    for _ in 0..200 {
        seg.tick();
        let state = seg.nodes[0].state();
        assert_ne!(state, InterfaceState::DR);
        assert_ne!(state, InterfaceState::Backup);
    }

    assert_eq!(seg.role(0), Some(Role::DROther));
    assert_eq!(seg.nodes[0].interface().election.dr, Some(id(2)));
    assert!(seg.role_commands(0).is_empty());
}

#[test]
fn single_eligible_candidate_is_dr() {
    let mut seg = Segment::new(vec![node(7, 0), node(8, 0), node(3, 4)]);
    for i in 0..3 {
        seg.start(i);
    }
    seg.advance(120);

    assert_eq!(seg.role(2), Some(Role::DR));
    assert_eq!(seg.role(0), Some(Role::DROther));
    assert_eq!(seg.role(1), Some(Role::DROther));
    assert_eq!(seg.nodes[0].interface().election.dr, Some(id(3)));
}

#[test]
fn foreign_group_is_invisible() {
    let mut other = ApcConfig {
        group_id: 7,
        ..Default::default()
    };
    other.interface = "test0".to_string();
    let foreign = Coordinator::new(
        other,
        LocalAddress {
            ip: id(5),
            mac: [2, 0, 0, 0, 0, 5],
        },
    );

    let mut seg = Segment::new(vec![node(1, 1), foreign]);
    seg.start(0);
    seg.start(1);
    seg.advance(100);

    assert_eq!(seg.nodes[0].interface().neighbor_count(), 0);
    assert!(seg.nodes[0].stats().group_mismatches > 0);
    assert_eq!(seg.role(0), Some(Role::DR));
    assert_eq!(seg.role(1), Some(Role::DR));
}

#[test]
fn hello_round_trip_preserves_interface_state() {
    let mut seg = Segment::new(vec![node(1, 10), node(2, 20), node(3, 0)]);
    for i in 0..3 {
        seg.start(i);
    }
    seg.advance(60);

    let iface = seg.nodes[1].interface();
    let hello = iface.build_hello(HelloKind::Hello);
    let decoded = HelloPacket::parse(&hello.to_bytes()).unwrap();

    assert_eq!(decoded.group_id, 42);
    assert_eq!(decoded.router_id, id(2));
    assert_eq!(decoded.priority, 20);
    assert_eq!(decoded.hello_interval, 10);
    assert_eq!(decoded.dead_interval, 40);
    assert_eq!(decoded.declared_dr(), iface.election.dr);
    assert_eq!(decoded.declared_bdr(), iface.election.bdr);
    assert_eq!(decoded.mac, [2, 0, 0, 0, 0, 2]);

    let mut listed = decoded.neighbors.clone();
    listed.sort();
    assert_eq!(listed, vec![id(1), id(3)]);
}
