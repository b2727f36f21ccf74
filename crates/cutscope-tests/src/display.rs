//! Display view state and whole-monitor behaviour.

use crate::support::{frame, EngineCall, Harness, WAIT};
use cutscope_core::{FrameRate, Profile, Vec2};
use cutscope_gpu::{CpuBackend, RecordingPresenter};
use cutscope_monitor::{
    DropFrameConfig, EventReceiver, Monitor, MonitorConfig, MonitorError, MonitorEvent,
    PlaybackStatus, StaticProfile,
};
use num_rational::Rational64;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_zoom_and_offset_round_trip_under_publication() {
    let mut h = Harness::new(100_000);
    h.load();

    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let sink = h.sink.clone();
        let running = running.clone();
        thread::spawn(move || {
            let mut position = 0;
            while running.load(Ordering::SeqCst) {
                sink.on_frame_produced(frame(position));
                position += 1;
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    for _ in 0..20 {
        let display = h.monitor.display_mut();
        display.set_zoom(2.0);
        display.set_offset(Vec2::new(10.0, 20.0));
        h.monitor.tick().unwrap();
        assert_eq!(h.monitor.display().zoom(), 2.0);
        assert_eq!(h.monitor.display().offset(), Vec2::new(10.0, 20.0));
    }
    running.store(false, Ordering::SeqCst);
    producer.join().unwrap();

    let events = h.drain_events();
    assert!(events.contains(&MonitorEvent::ZoomChanged(2.0)));
    assert!(events.contains(&MonitorEvent::OffsetChanged(Vec2::new(10.0, 20.0))));
}

#[test]
fn test_resize_keeps_aspect_and_reports_rect() {
    let mut h = Harness::new(10);
    h.drain_events();
    h.monitor.display_mut().resize(640, 640);
    let rect = h.monitor.display().display_rect();
    assert_eq!(rect.width, 640.0);
    assert_eq!(rect.height, 360.0);
    assert_eq!(rect.y, 140.0);
    assert!(h.drain_events().contains(&MonitorEvent::RectChanged(rect)));
}

#[test]
fn test_unsupported_frames_are_lost_not_fatal() {
    let config = MonitorConfig {
        lost_frame_threshold: 2,
        ..Default::default()
    };
    let mut h = Harness::with_config(config, 1000);
    h.load();
    h.drain_events();

    for position in 0..4 {
        let odd = cutscope_core::Frame::new(
            position,
            cutscope_core::RationalTime::from_frames(position, FrameRate::FPS_25),
            cutscope_core::FrameBuffer::new(64, 36, cutscope_core::PixelFormat::Yuv420P10),
        );
        h.sink.on_frame_produced(odd);
        h.settle();
    }
    h.deliver(4);
    h.settle();

    assert_eq!(h.monitor.stats().lost, 4);
    let outcome = h.monitor.tick().unwrap();
    assert_eq!(outcome.new_frame.map(|s| s.position), Some(4));
    assert_eq!(outcome.skipped, 0);
    assert_eq!(h.monitor.stats().dropped, 0);
    let losses: Vec<_> = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, MonitorEvent::FrameLoss { .. }))
        .collect();
    assert_eq!(losses, vec![MonitorEvent::FrameLoss { lost: 3 }]);
}

fn big_frame(position: i64) -> cutscope_core::Frame {
    cutscope_core::Frame::new(
        position,
        cutscope_core::RationalTime::from_frames(position, FrameRate::FPS_25),
        cutscope_core::FrameBuffer::solid_yuv(128, 72, 16, 128, 128),
    )
}

/// Monitor whose texture budget fits one 64x36 YUV frame but not frames
/// twice that size.
fn starved_monitor() -> (Monitor, EventReceiver, Arc<crate::support::MockEngine>) {
    let profile = Profile::new(64, 36, FrameRate::FPS_25);
    let engine = Arc::new(crate::support::MockEngine::new(1000, profile));
    let backend = Arc::new(CpuBackend::with_budget(64 * 36 * 3));
    let (mut monitor, events) = Monitor::new(
        MonitorConfig::default(),
        engine.clone(),
        Arc::new(StaticProfile(profile)),
        backend,
        Box::new(RecordingPresenter::new()),
    )
    .unwrap();
    monitor
        .controller_mut()
        .set_producer(cutscope_monitor::ProducerHandle::new("big"), true, None)
        .unwrap();
    (monitor, events, engine)
}

/// Play and feed oversized frames until the monitor gives up.
fn play_until_fatal(monitor: &mut Monitor, first: i64) -> Option<MonitorError> {
    monitor.controller_mut().play(Rational64::from_integer(1)).unwrap();
    let sink = monitor.frame_sink();
    for position in first..first + 4 {
        sink.on_frame_produced(big_frame(position));
        assert!(monitor.wait_until_idle(WAIT));
        if let Err(e) = monitor.pump_events() {
            return Some(e);
        }
    }
    None
}

#[test]
fn test_exhausted_texture_memory_stops_playback() {
    let (mut monitor, events, engine) = starved_monitor();
    let fatal = play_until_fatal(&mut monitor, 0);

    assert!(matches!(fatal, Some(MonitorError::ResourceExhausted(_))));
    let state = monitor.controller().state();
    assert_eq!(state.status, PlaybackStatus::Stopped);
    assert!(state.error.is_some());
    assert!(engine.calls().contains(&EngineCall::Stop));

    let events: Vec<_> = events.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, MonitorEvent::Error(_))));
    // one stop, carrying the error
    let stops: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, MonitorEvent::Stopped { .. }))
        .collect();
    assert_eq!(stops.len(), 1);
    assert!(matches!(stops[0], MonitorEvent::Stopped { error: Some(_) }));
}

#[test]
fn test_exhausted_texture_memory_stops_every_session() {
    let (mut monitor, events, _engine) = starved_monitor();
    let first = play_until_fatal(&mut monitor, 0);
    assert!(matches!(first, Some(MonitorError::ResourceExhausted(_))));

    let second = play_until_fatal(&mut monitor, 10);
    assert!(matches!(second, Some(MonitorError::ResourceExhausted(_))));
    assert_eq!(monitor.controller().state().status, PlaybackStatus::Stopped);

    let errors = events
        .try_iter()
        .filter(|e| matches!(e, MonitorEvent::Error(_)))
        .count();
    assert_eq!(errors, 2);
}

#[test]
fn test_sustained_drops_turn_on_frame_skipping() {
    let config = MonitorConfig {
        drop_frames: DropFrameConfig {
            enabled: true,
            threshold: 3,
            window_frames: 4,
        },
        ..Default::default()
    };
    let mut h = Harness::with_config(config, 1000);
    h.load();

    // two frames per paint: one of them is always dropped
    let mut position = 0;
    for _ in 0..3 {
        h.deliver(position);
        h.deliver(position + 1);
        position += 2;
        h.settle();
        h.monitor.tick().unwrap();
    }
    assert!(h.engine.calls().contains(&EngineCall::FrameSkipping(true)));
    assert!(h.monitor.controller().drop_policy().is_skipping());

    // a clean window releases it
    for _ in 0..4 {
        h.deliver(position);
        position += 1;
        h.settle();
        h.monitor.tick().unwrap();
    }
    assert!(h.engine.calls().contains(&EngineCall::FrameSkipping(false)));
    assert_eq!(h.monitor.controller().dropped_frames(), h.monitor.stats().dropped);

    h.monitor.controller_mut().reset_drops();
    assert_eq!(h.monitor.stats().dropped, 0);
}

#[test]
fn test_reconfigure_reallocates_textures() {
    let profile = Arc::new(Mutex::new(Profile::new(64, 36, FrameRate::FPS_25)));
    struct SharedProfile(Arc<Mutex<Profile>>);
    impl cutscope_monitor::ProfileProvider for SharedProfile {
        fn profile(&self) -> Profile {
            *self.0.lock()
        }
    }

    let engine = Arc::new(crate::support::MockEngine::new(1000, *profile.lock()));
    let backend = Arc::new(CpuBackend::new());
    let (mut monitor, _events) = Monitor::new(
        MonitorConfig::default(),
        engine,
        Arc::new(SharedProfile(profile.clone())),
        backend.clone(),
        Box::new(RecordingPresenter::new()),
    )
    .unwrap();
    monitor
        .controller_mut()
        .set_producer(cutscope_monitor::ProducerHandle::new("clip"), true, None)
        .unwrap();
    let sink = monitor.frame_sink();
    sink.on_frame_produced(frame(0));
    assert!(monitor.wait_until_idle(WAIT));
    monitor.tick().unwrap();
    assert!(backend.live_textures() > 0);

    *profile.lock() = Profile::new(128, 72, FrameRate::FPS_50);
    let applied = monitor.reconfigure().unwrap();
    assert_eq!(applied.width, 128);
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(monitor.display().profile_size(), (128, 72));
    assert_eq!(monitor.refresh_interval(), Duration::from_millis(20));
    assert_eq!(monitor.tick().unwrap().new_frame, None);
}

#[test]
fn test_analysis_tap_receives_frames() {
    let config = MonitorConfig {
        send_frame_for_analysis: true,
        ..Default::default()
    };
    let mut h = Harness::with_config(config, 1000);
    h.load();
    h.deliver(3);
    h.settle();
    let frames = h.monitor.analysis_frames().expect("analysis enabled");
    assert_eq!(frames.recv_timeout(WAIT).unwrap().position, 3);
}

#[test]
fn test_shutdown_releases_everything() {
    let mut h = Harness::new(1000);
    h.load();
    h.deliver(1);
    h.settle();
    h.monitor.tick().unwrap();
    assert!(h.backend.live_textures() > 0);

    h.monitor.shutdown().unwrap();
    assert!(h.monitor.is_shut_down());
    assert_eq!(h.backend.live_textures(), 0);
    h.monitor.shutdown().unwrap();

    // the sink outlives the monitor threads and stays harmless
    h.deliver(2);
}

#[test]
fn test_tick_if_due_follows_refresh_rate() {
    let mut h = Harness::new(10);
    let now = std::time::Instant::now();
    assert!(h.monitor.tick_if_due(now).unwrap().is_some());
    assert!(h.monitor.tick_if_due(std::time::Instant::now()).unwrap().is_none());
    let later = std::time::Instant::now() + Duration::from_millis(41);
    assert!(h.monitor.tick_if_due(later).unwrap().is_some());
}
