//! Criterion benchmarks for [`RoutingResolver`] route resolution.
//!
//! Measures how resolution time grows with the number of switchers between a
//! source and a display.
//!
//! Run with:
//! ```bash
//! cargo bench --package av-core --bench routing_bench
//! ```

use std::sync::Arc;

use av_core::{
    Device, DeviceError, DeviceRegistry, Port, PortKind, RoutingResolver, RoutingSwitcher,
    SignalType, TieLineCollection, TieLineConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

// ── Fixture ───────────────────────────────────────────────────────────────────

struct Node {
    key: String,
    ports: Vec<Port>,
    switching: bool,
}

impl Device for Node {
    fn key(&self) -> &str {
        &self.key
    }
    fn type_name(&self) -> &str {
        "bench"
    }
    fn ports(&self) -> &[Port] {
        &self.ports
    }
    fn as_switcher(&self) -> Option<&dyn RoutingSwitcher> {
        self.switching.then_some(self as &dyn RoutingSwitcher)
    }
}

impl RoutingSwitcher for Node {
    fn execute_switch(&self, _: &str, _: Option<&str>, _: SignalType) -> Result<(), DeviceError> {
        Ok(())
    }
}

fn node(key: &str, switching: bool) -> Arc<Node> {
    Arc::new(Node {
        key: key.to_string(),
        ports: vec![
            Port::input("in1", PortKind::AudioVideo),
            Port::input("in2", PortKind::AudioVideo),
            Port::output("out1", PortKind::AudioVideo),
            Port::output("out2", PortKind::AudioVideo),
        ],
        switching,
    })
}

fn tie(src: &str, sp: &str, dst: &str, dp: &str) -> TieLineConfig {
    TieLineConfig {
        source_key: src.into(),
        source_port: sp.into(),
        destination_key: dst.into(),
        destination_port: dp.into(),
        signal: SignalType::AudioVideo,
    }
}

/// `source → sw0 → sw1 → … → sw(n-1) → display`, with a dead-end branch
/// from every switcher's second output.
fn build_chain(n: usize) -> RoutingResolver {
    let registry = Arc::new(DeviceRegistry::new());
    let resolver = RoutingResolver::new(Arc::clone(&registry), Arc::new(TieLineCollection::new()));
    registry.add(node("source", false)).expect("unique key");
    registry.add(node("display", true)).expect("unique key");

    let mut ties = Vec::new();
    let mut upstream = "source".to_string();
    for i in 0..n {
        let key = format!("sw{i}");
        registry.add(node(&key, true)).expect("unique key");
        ties.push(tie(&upstream, "out1", &key, "in1"));
        ties.push(tie(&key, "out2", "display", "in2"));
        upstream = key;
    }
    ties.push(tie(&upstream, "out1", "display", "in1"));
    resolver.load_tie_lines(&ties);
    resolver
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_resolve_route_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_route");

    for &hops in &[0usize, 2, 8, 32] {
        let resolver = build_chain(hops);
        group.bench_with_input(BenchmarkId::new("switchers", hops), &hops, |b, _| {
            b.iter(|| {
                resolver.resolve_route(
                    black_box("source"),
                    black_box("display"),
                    black_box(SignalType::AudioVideo),
                )
            })
        });
    }

    group.finish();
}

fn bench_unreachable_route(c: &mut Criterion) {
    let resolver = build_chain(8);
    c.bench_function("resolve_route_unreachable", |b| {
        b.iter(|| resolver.resolve_route(black_box("display"), black_box("source"), SignalType::Video))
    });
}

criterion_group!(benches, bench_resolve_route_scaling, bench_unreachable_route);
criterion_main!(benches);
