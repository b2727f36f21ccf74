//! Benchmarks for the frame gate handshake.
//!
//! Run with: cargo bench -p cutscope-monitor

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cutscope_core::RationalTime;
use cutscope_monitor::{FrameGate, FrameStamp};
use std::time::Duration;

fn stamp(seq: u64) -> FrameStamp {
    FrameStamp {
        seq,
        position: seq as i64,
        pts: RationalTime::new(seq as i64, 25),
    }
}

fn bench_publish_consume(c: &mut Criterion) {
    let gate = FrameGate::new(vec![0u64; 3]);

    c.bench_function("gate_publish_consume", |bencher| {
        bencher.iter(|| {
            let seq = gate.ticket();
            let mut slot = gate
                .acquire_slot(gate.epoch(), Duration::from_millis(10))
                .expect("slot available");
            *slot = seq;
            slot.publish(stamp(seq));
            black_box(gate.consume_ready())
        });
    });
}

fn bench_consume_empty(c: &mut Criterion) {
    let gate = FrameGate::new(vec![0u64; 3]);

    c.bench_function("gate_consume_nothing_new", |bencher| {
        bencher.iter(|| black_box(gate.consume_ready()));
    });
}

fn bench_latest_wins_burst(c: &mut Criterion) {
    let gate = FrameGate::new(vec![0u64; 3]);

    c.bench_function("gate_burst_of_10", |bencher| {
        bencher.iter(|| {
            for _ in 0..10 {
                let seq = gate.ticket();
                let slot = gate
                    .acquire_slot(gate.epoch(), Duration::from_millis(10))
                    .expect("slot available");
                slot.publish(stamp(seq));
            }
            black_box(gate.consume_ready())
        });
    });
}

criterion_group!(benches, bench_publish_consume, bench_consume_empty, bench_latest_wins_burst);
criterion_main!(benches);
