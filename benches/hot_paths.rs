use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use flowtop::top::stats::{AtomicTable, TableWriter};
use flowtop::top::{TopConfig, TopSampler};
use flowtop::tracer::{Direction, IpFamily, TrafficSample};

fn traffic_sample(i: u32) -> TrafficSample {
    TrafficSample {
        pid: 4_000 + (i % 512),
        comm: "nginx".to_string(),
        uid: 1000,
        gid: 1000,
        saddr: IpAddr::V4(Ipv4Addr::new(192, 168, 0, (i % 250) as u8 + 1)),
        daddr: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        sport: 40_000 + (i % 1024) as u16,
        dport: 443,
        family: IpFamily::V4,
        direction: if i % 2 == 0 {
            Direction::Tx
        } else {
            Direction::Rx
        },
        bytes: 1_024 + u64::from(i % 4_096),
    }
}

fn bench_record(c: &mut Criterion) {
    let table = Arc::new(AtomicTable::new());
    let writer = TableWriter::new(table);
    let samples: Vec<TrafficSample> = (0..1_024).map(traffic_sample).collect();

    c.bench_function("record_1024_samples", |b| {
        b.iter(|| {
            for sample in &samples {
                writer.record(black_box(sample));
            }
        });
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let cfg = TopConfig::new(20, Duration::from_secs(1), "-sent,-received", 0, "")
        .expect("valid config");

    c.bench_function("snapshot_sort_truncate_8k_rows", |b| {
        b.iter_with_setup(
            || {
                let sampler = TopSampler::new(cfg.clone());
                let writer = sampler.writer();
                for i in 0..8_192 {
                    writer.record(&traffic_sample(i));
                }
                sampler
            },
            |sampler| {
                black_box(sampler.sample_now());
            },
        );
    });
}

criterion_group!(benches, bench_record, bench_snapshot);
criterion_main!(benches);
