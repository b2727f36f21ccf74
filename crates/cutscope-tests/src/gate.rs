//! Frame gate handshake under concurrency.

use crate::support::{Harness, WAIT};
use cutscope_core::RationalTime;
use cutscope_monitor::{FrameGate, FrameStamp, MonitorEvent};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WORDS: usize = 256;

fn stamp(seq: u64) -> FrameStamp {
    FrameStamp {
        seq,
        position: seq as i64,
        pts: RationalTime::new(seq as i64, 25),
    }
}

#[test]
fn test_displayed_slot_is_never_written() {
    let gate = Arc::new(FrameGate::new(vec![[0u64; WORDS]; 3]));
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let gate = gate.clone();
        let done = done.clone();
        thread::spawn(move || {
            for _ in 0..2000 {
                let seq = gate.ticket();
                let mut slot = gate
                    .acquire_slot(gate.epoch(), Duration::from_secs(1))
                    .expect("writer starved");
                for word in slot.iter_mut() {
                    *word = seq;
                }
                slot.publish(stamp(seq));
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let mut last_position = -1;
    let mut presented = 0u64;
    let mut skipped = 0u64;
    loop {
        let finished = done.load(Ordering::SeqCst);
        if let Some(consumed) = gate.consume_ready() {
            assert!(consumed.stamp.position > last_position, "positions went backwards");
            last_position = consumed.stamp.position;
            presented += 1;
            skipped += consumed.skipped;
        }
        gate.with_displayed(|words, stamp| {
            assert!(
                words.iter().all(|w| *w == stamp.seq),
                "displayed slot for {} was modified",
                stamp.seq
            );
        });
        if finished && !gate.has_ready() {
            break;
        }
    }
    writer.join().expect("writer panicked");

    assert_eq!(last_position, 1999);
    assert_eq!(presented + skipped, 2000);
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Publish,
    Consume,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![3 => Just(Op::Publish), 2 => Just(Op::Consume)]
}

proptest! {
    #[test]
    fn test_every_published_frame_is_shown_or_counted(ops in prop::collection::vec(op(), 1..200)) {
        let gate = FrameGate::new(vec![(); 3]);
        let mut published = 0u64;
        let mut accounted = 0u64;
        let mut newest = None;

        for op in ops.iter().copied().chain(std::iter::once(Op::Consume)) {
            match op {
                Op::Publish => {
                    let seq = gate.ticket();
                    let slot = gate.acquire_slot(gate.epoch(), Duration::from_millis(10)).unwrap();
                    prop_assert!(slot.publish(stamp(seq)));
                    published += 1;
                    newest = Some(seq);
                }
                Op::Consume => {
                    if let Some(consumed) = gate.consume_ready() {
                        prop_assert_eq!(Some(consumed.stamp.seq), newest);
                        accounted += 1 + consumed.skipped;
                    }
                }
            }
        }
        prop_assert_eq!(accounted, published);
    }
}

#[test]
fn test_burst_of_ten_shows_only_the_newest() {
    let mut h = Harness::new(1000);
    h.load();
    h.drain_events();

    for position in 10..20 {
        h.deliver(position);
    }
    h.settle();

    let first = h.monitor.tick().unwrap();
    let second = h.monitor.tick().unwrap();
    assert_eq!(first.new_frame.map(|s| s.position), Some(19));
    assert_eq!(first.skipped, 9);
    assert_eq!(second.new_frame, None);
    assert_eq!(h.monitor.stats().dropped, 9);
    assert_eq!(h.presenter.last().and_then(|c| c.position()), Some(19));

    let events = h.drain_events();
    assert!(events.contains(&MonitorEvent::DroppedFramesChanged(9)));
}

#[test]
fn test_renderer_keeps_up_with_a_steady_producer() {
    let mut h = Harness::new(1000);
    h.load();

    for position in 0..50 {
        h.deliver(position);
        assert!(h.monitor.wait_until_idle(WAIT));
        let outcome = h.monitor.tick().unwrap();
        assert_eq!(outcome.new_frame.map(|s| s.position), Some(position));
        assert_eq!(outcome.skipped, 0);
    }
    let stats = h.monitor.stats();
    assert_eq!(stats.presented, 50);
    assert_eq!(stats.dropped, 0);
    assert_eq!(h.monitor.proxy().position(), 49);
}
