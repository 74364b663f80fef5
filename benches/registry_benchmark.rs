use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};

use tether::signaling::{ConnectionId, Registry, ServerMessage, SessionId, Transport};

const SESSIONS: usize = 10_000;
const VIEWERS_PER_SESSION: usize = 4;

/// deterministic, collision-free id for the `n`-th benchmark connection
fn conn(n: usize) -> ConnectionId {
    ConnectionId::parse(&format!("conn_{n:016x}")).expect("id fits")
}

/// transport that drops everything
struct Discard;

impl Transport for Discard {
    fn send_to(&mut self, to: ConnectionId, message: &ServerMessage) {
        black_box((to, message));
    }
}

/// a registry with many populated sessions, plus one host and one viewer to remove
fn populated_registry() -> (Registry, ConnectionId, ConnectionId) {
    let mut registry = Registry::new();
    let mut next = 0;
    let mut hosts = Vec::with_capacity(SESSIONS);

    for i in 0..SESSIONS {
        let host = conn(next);
        next += 1;
        let session_id = SessionId::from(format!("session-{i}"));
        registry.create_session(session_id.clone(), host, &mut Discard);
        for _ in 0..VIEWERS_PER_SESSION {
            let _ = registry.join_session(session_id.clone(), conn(next), &mut Discard);
            next += 1;
        }
        hosts.push(host);
    }

    let viewer = conn(next);
    let _ = registry.join_session(SessionId::from("session-0"), viewer, &mut Discard);

    (registry, hosts[SESSIONS / 2], viewer)
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("Join");
    group.throughput(Throughput::Elements(1));

    group.bench_function("join_session", |b| {
        b.iter_batched(
            || {
                let mut registry = Registry::new();
                registry.create_session(SessionId::from("S1"), conn(0), &mut Discard);
                registry
            },
            |mut registry| {
                let count = registry
                    .join_session(SessionId::from("S1"), conn(1), &mut Discard)
                    .unwrap();
                black_box(count)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_disconnect(c: &mut Criterion) {
    let mut group = c.benchmark_group("Disconnect");
    group.throughput(Throughput::Elements(1));

    group.bench_function("host", |b| {
        b.iter_batched(
            populated_registry,
            |(mut registry, host, _)| black_box(registry.disconnect(host, &mut Discard)),
            BatchSize::LargeInput,
        )
    });

    group.bench_function("viewer", |b| {
        b.iter_batched(
            populated_registry,
            |(mut registry, _, viewer)| black_box(registry.disconnect(viewer, &mut Discard)),
            BatchSize::LargeInput,
        )
    });

    group.bench_function("unknown", |b| {
        let (mut registry, _, _) = populated_registry();
        let stranger = conn(usize::MAX);
        b.iter(|| black_box(registry.disconnect(black_box(stranger), &mut Discard)))
    });

    group.finish();
}

criterion_group!(benches, bench_join, bench_disconnect);
criterion_main!(benches);
