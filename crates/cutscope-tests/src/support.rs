//! Scripted engine and monitor harness shared by the integration tests.

use cutscope_core::{Frame, FrameBuffer, FrameRate, Profile, RationalTime};
use cutscope_gpu::{CpuBackend, RecordingPresenter};
use cutscope_monitor::{
    EngineError, EngineResult, EventReceiver, FrameSink, Monitor, MonitorConfig, MonitorEvent,
    PlaybackEngine, ProducerHandle, StaticProfile,
};
use num_rational::Rational64;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    SetProducer(Option<i64>),
    Play(Rational64),
    Pause,
    Seek(i64),
    Stop,
    FrameSkipping(bool),
}

/// Records every command; frames are delivered by the test itself.
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    duration: AtomicI64,
    profile: Profile,
    refuse: AtomicBool,
}

impl MockEngine {
    pub fn new(duration: i64, profile: Profile) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            duration: AtomicI64::new(duration),
            profile,
            refuse: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                EngineCall::Seek(p) => Some(*p),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &EngineCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    /// Make every following command fail.
    pub fn refuse_commands(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    fn record(&self, call: EngineCall) -> EngineResult<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EngineError::new(format!("refused {call:?}")));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl PlaybackEngine for MockEngine {
    fn set_producer(&self, _producer: &ProducerHandle, _is_active: bool, position: Option<i64>) -> EngineResult<()> {
        self.record(EngineCall::SetProducer(position))
    }

    fn play(&self, speed: Rational64) -> EngineResult<()> {
        self.record(EngineCall::Play(speed))
    }

    fn pause(&self) -> EngineResult<()> {
        self.record(EngineCall::Pause)
    }

    fn seek(&self, position: i64) -> EngineResult<()> {
        self.record(EngineCall::Seek(position))
    }

    fn stop(&self) -> EngineResult<()> {
        self.record(EngineCall::Stop)
    }

    fn duration(&self) -> i64 {
        self.duration.load(Ordering::SeqCst)
    }

    fn profile(&self) -> Profile {
        self.profile
    }

    fn set_frame_skipping(&self, enabled: bool) -> EngineResult<()> {
        self.record(EngineCall::FrameSkipping(enabled))
    }
}

pub fn test_profile() -> Profile {
    Profile::new(64, 36, FrameRate::FPS_25)
}

/// A small YUV frame whose luma encodes its position.
pub fn frame(position: i64) -> Frame {
    let luma = 16 + position.rem_euclid(200) as u8;
    Frame::new(
        position,
        RationalTime::from_frames(position, FrameRate::FPS_25),
        FrameBuffer::solid_yuv(64, 36, luma, 128, 128),
    )
}

pub struct Harness {
    pub monitor: Monitor,
    pub events: EventReceiver,
    pub engine: Arc<MockEngine>,
    pub sink: FrameSink,
    pub presenter: RecordingPresenter,
    pub backend: Arc<CpuBackend>,
}

impl Harness {
    pub fn new(duration: i64) -> Self {
        Self::with_config(MonitorConfig::default(), duration)
    }

    pub fn with_config(config: MonitorConfig, duration: i64) -> Self {
        let profile = test_profile();
        let engine = Arc::new(MockEngine::new(duration, profile));
        let backend = Arc::new(CpuBackend::new());
        let presenter = RecordingPresenter::new();
        let (mut monitor, events) = Monitor::new(
            config,
            engine.clone(),
            Arc::new(StaticProfile(profile)),
            backend.clone(),
            Box::new(presenter.clone()),
        )
        .expect("monitor should start");
        monitor.display_mut().resize(640, 360);
        let sink = monitor.frame_sink();
        Self {
            monitor,
            events,
            engine,
            sink,
            presenter,
            backend,
        }
    }

    /// Load a producer with the playhead at 0.
    pub fn load(&mut self) {
        self.monitor
            .controller_mut()
            .set_producer(ProducerHandle::new("clip"), true, None)
            .expect("set_producer");
    }

    pub fn deliver(&self, position: i64) {
        self.sink.on_frame_produced(frame(position));
    }

    /// Wait for the renderer to drain, then let the controller see its events.
    pub fn settle(&mut self) {
        assert!(self.monitor.wait_until_idle(WAIT), "renderer did not become idle");
        self.monitor.pump_events().expect("pump events");
    }

    pub fn drain_events(&self) -> Vec<MonitorEvent> {
        self.events.try_iter().collect()
    }

    pub fn positions_changed(events: &[MonitorEvent]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::PositionChanged(p) => Some(*p),
                _ => None,
            })
            .collect()
    }
}
