//! Transport commands against a scripted engine.

use crate::support::{EngineCall, Harness};
use cutscope_core::Zone;
use cutscope_monitor::{Marker, MonitorError, MonitorEvent, PlaybackStatus, RendererState};
use num_rational::Rational64;

fn speed(n: i64) -> Rational64 {
    Rational64::from_integer(n)
}

#[test]
fn test_only_last_coalesced_seek_reaches_engine() {
    let mut h = Harness::new(1000);
    h.load();
    h.drain_events();

    let controller = h.monitor.controller_mut();
    controller.seek(100).unwrap();
    controller.seek(300).unwrap();
    controller.seek(500).unwrap();
    assert_eq!(h.engine.seeks(), vec![100]);
    assert_eq!(h.monitor.controller().pending_seek(), Some(500));

    // the engine answers the first seek; a newer one is queued, so the frame is skipped
    h.deliver(100);
    h.settle();
    assert_eq!(h.engine.seeks(), vec![100, 500]);

    h.deliver(500);
    h.settle();
    h.monitor.tick().unwrap();

    let events = h.drain_events();
    assert_eq!(Harness::positions_changed(&events), vec![500]);
    assert_eq!(h.monitor.proxy().position(), 500);
    assert_eq!(h.presenter.last().and_then(|c| c.position()), Some(500));
}

#[test]
fn test_frames_before_seek_target_are_discarded() {
    let mut h = Harness::new(1000);
    h.load();
    h.monitor.controller_mut().seek(40).unwrap();

    for position in 30..40 {
        h.deliver(position);
    }
    h.settle();
    assert_eq!(h.monitor.stats().received, 0);

    h.deliver(40);
    h.settle();
    assert_eq!(h.monitor.stats().received, 1);
    assert_eq!(h.monitor.controller().seek_in_flight(), None);
    assert_eq!(h.monitor.controller().position(), 40);
}

#[test]
fn test_seek_clamps_to_duration() {
    let mut h = Harness::new(1000);
    h.load();
    let controller = h.monitor.controller_mut();
    controller.seek(5000).unwrap();
    assert_eq!(h.engine.seeks(), vec![999]);
}

#[test]
fn test_pause_twice_is_idempotent() {
    let mut h = Harness::new(1000);
    h.load();
    let controller = h.monitor.controller_mut();
    controller.play(speed(1)).unwrap();
    controller.pause().unwrap();
    let after_first = controller.state().clone();
    controller.pause().unwrap();
    assert_eq!(*controller.state(), after_first);
    assert_eq!(after_first.status, PlaybackStatus::Paused);
    assert_eq!(h.engine.count(&EngineCall::Pause), 1);

    let events = h.drain_events();
    let paused = events.iter().filter(|e| **e == MonitorEvent::Paused).count();
    assert_eq!(paused, 1);
}

#[test]
fn test_play_emits_started_once() {
    let mut h = Harness::new(1000);
    h.load();
    h.drain_events();
    let controller = h.monitor.controller_mut();
    controller.play(speed(1)).unwrap();
    controller.play(speed(2)).unwrap();

    let events = h.drain_events();
    let started = events.iter().filter(|e| **e == MonitorEvent::Started).count();
    assert_eq!(started, 1);
    assert!(events.contains(&MonitorEvent::Playing { speed: speed(2) }));
    assert_eq!(h.monitor.controller().speed(), speed(2));
}

#[test]
fn test_play_zero_speed_pauses() {
    let mut h = Harness::new(1000);
    h.load();
    let controller = h.monitor.controller_mut();
    controller.play(speed(1)).unwrap();
    controller.play(speed(0)).unwrap();
    assert_eq!(controller.state().status, PlaybackStatus::Paused);
}

#[test]
fn test_zone_loop_returns_to_start() {
    let mut h = Harness::new(1000);
    h.load();
    let controller = h.monitor.controller_mut();
    controller.set_zone(Some(Zone::new(100, 200)));
    assert!(controller.play_zone(true).unwrap());
    assert_eq!(h.engine.seeks(), vec![100]);

    h.deliver(100);
    h.settle();
    h.deliver(199);
    h.settle();
    let at_end = h.monitor.tick().unwrap();
    assert_eq!(at_end.new_frame.map(|s| s.position), Some(199));
    // reaching the last zone frame sends the engine back to the start
    assert_eq!(h.engine.seeks(), vec![100, 100]);

    // the engine had already produced one frame past the zone
    h.deliver(200);
    h.deliver(100);
    h.settle();
    let looped = h.monitor.tick().unwrap();
    assert_eq!(looped.new_frame.map(|s| s.position), Some(100));

    let shown: Vec<_> = h.presenter.commands().iter().filter_map(|c| c.position()).collect();
    assert!(!shown.contains(&200));
    assert!(h.monitor.controller().is_playing());
}

#[test]
fn test_zone_end_without_loop_pauses() {
    let mut h = Harness::new(1000);
    h.load();
    let controller = h.monitor.controller_mut();
    controller.set_zone(Some(Zone::new(0, 10)));
    assert!(controller.play_zone(false).unwrap());

    // the frame past the zone arrives before the controller saw the last one
    h.deliver(9);
    h.deliver(10);
    h.settle();

    let state = h.monitor.controller().state();
    assert_eq!(state.status, PlaybackStatus::Paused);
    assert!(!state.zone_playing);
    assert_eq!(state.position, 9);
    assert_eq!(h.engine.count(&EngineCall::Pause), 1);
}

#[test]
fn test_play_zone_without_zone() {
    let mut h = Harness::new(1000);
    h.load();
    assert!(!h.monitor.controller_mut().play_zone(true).unwrap());
    assert!(h.engine.calls().iter().all(|c| !matches!(c, EngineCall::Play(_))));
}

#[test]
fn test_loop_clip_covers_whole_producer() {
    let mut h = Harness::new(50);
    h.load();
    assert!(h.monitor.controller_mut().loop_clip().unwrap());
    let state = h.monitor.controller().state();
    assert_eq!(state.zone, Some(Zone::new(0, 50)));
    assert!(state.loop_zone);
}

#[test]
fn test_zero_duration_seek_clamps_to_zero() {
    let mut h = Harness::new(0);
    let proxy = h.monitor.proxy();
    assert_eq!(proxy.position(), 0);
    assert_eq!(proxy.duration(), 0);

    h.load();
    h.monitor.controller_mut().seek(12_345).unwrap();
    assert_eq!(h.engine.seeks(), vec![0]);
    assert_eq!(proxy.position(), 0);
    assert_eq!(proxy.duration(), 0);
}

#[test]
fn test_commands_without_producer_are_protocol_errors() {
    let mut h = Harness::new(1000);
    let controller = h.monitor.controller_mut();
    assert!(matches!(controller.seek(10), Err(MonitorError::Protocol(_))));
    assert!(matches!(controller.play(speed(1)), Err(MonitorError::Protocol(_))));
    assert!(h.engine.calls().is_empty());
}

#[test]
fn test_engine_refusal_stops_with_error() {
    let mut h = Harness::new(1000);
    h.load();
    h.drain_events();
    h.engine.refuse_commands(true);

    let err = h.monitor.controller_mut().play(speed(1)).unwrap_err();
    assert!(matches!(err, MonitorError::Engine { command: "play", .. }));

    let state = h.monitor.controller().state();
    assert_eq!(state.status, PlaybackStatus::Stopped);
    assert!(state.error.is_some());
    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, MonitorEvent::Stopped { error: Some(_) })));
}

#[test]
fn test_stop_is_synchronous_and_flushes() {
    let mut h = Harness::new(1000);
    h.load();
    h.monitor.controller_mut().play(speed(1)).unwrap();

    h.deliver(0);
    h.settle();
    h.monitor.tick().unwrap();
    for position in 1..6 {
        h.deliver(position);
    }
    h.monitor.controller_mut().stop().unwrap();
    assert_eq!(h.monitor.renderer_state(), RendererState::Idle);

    // nothing uploaded before the stop reaches the screen
    let after = h.monitor.tick().unwrap();
    assert_eq!(after.new_frame, None);

    // frames arriving after the stop are refused
    let received = h.monitor.stats().received;
    h.deliver(7);
    h.settle();
    assert_eq!(h.monitor.stats().received, received);
    assert_eq!(h.monitor.controller().state().status, PlaybackStatus::Stopped);
    assert!(h.drain_events().contains(&MonitorEvent::Stopped { error: None }));
}

#[test]
fn test_set_producer_resets_state() {
    let mut h = Harness::new(1000);
    h.load();
    let controller = h.monitor.controller_mut();
    controller.set_zone(Some(Zone::new(10, 20)));
    controller.play(speed(1)).unwrap();
    h.load();

    let state = h.monitor.controller().state();
    assert_eq!(state.status, PlaybackStatus::Paused);
    assert_eq!(state.zone, None);
    assert_eq!(h.monitor.proxy().duration(), 1000);
}

#[test]
fn test_set_producer_clears_previous_markers() {
    let mut h = Harness::new(1000);
    h.load();
    h.monitor
        .controller_mut()
        .set_ruler_info(1000, vec![Marker::new(10, "intro"), Marker::new(400, "cut")]);
    assert_eq!(h.monitor.proxy().markers().len(), 2);

    h.load();
    assert!(h.monitor.proxy().markers().is_empty());
    assert_eq!(h.monitor.proxy().zone(), None);
    assert_eq!(h.monitor.proxy().duration(), 1000);
}

#[test]
fn test_refresh_reseeks_current_position() {
    let mut h = Harness::new(1000);
    h.load();
    h.monitor.controller_mut().seek(20).unwrap();
    h.deliver(20);
    h.settle();
    h.monitor.controller_mut().request_refresh().unwrap();
    assert_eq!(h.engine.seeks(), vec![20, 20]);
}
