// Cost of mirroring a node snapshot into the metrics registry

use apc::{ApcStats, Election, InterfaceState, NeighborInfo, NeighborState, Snapshot};
use apc_server::metrics::MetricsRegistry;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::net::Ipv4Addr;
use std::time::Duration;

fn snapshot(neighbors: usize, hellos: u64) -> Snapshot {
    Snapshot {
        router_id: Ipv4Addr::new(10, 0, 0, 1),
        state: InterfaceState::DR,
        election: Election::default(),
        stats: ApcStats {
            hellos_sent: hellos,
            hellos_received: hellos * neighbors as u64,
            ..Default::default()
        },
        neighbors: (0..neighbors)
            .map(|i| NeighborInfo {
                router_id: Ipv4Addr::new(10, 0, (i >> 8) as u8, i as u8),
                mac: "02:00:00:00:00:01".to_string(),
                priority: 1,
                dr: None,
                bdr: None,
                state: NeighborState::TwoWay,
                expires_in: Duration::from_secs(40),
            })
            .collect(),
    }
}

fn bench_update_from_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_from_snapshot");

    for neighbors in [4, 64, 512] {
        let registry = MetricsRegistry::new();
        let mut hellos = 0;
        group.bench_with_input(BenchmarkId::from_parameter(neighbors), &neighbors, |b, &n| {
            b.iter(|| {
                hellos += 1;
                registry.update_from_snapshot(black_box(&snapshot(n, hellos)));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update_from_snapshot);
criterion_main!(benches);
