//! A playback engine that renders a moving luma ramp instead of decoding.

use crossbeam_channel::{RecvTimeoutError, Sender};
use cutscope_core::{Frame, FrameBuffer, Profile, RationalTime};
use cutscope_monitor::{EngineError, EngineResult, FrameSink, PlaybackEngine, ProducerHandle};
use num_rational::Rational64;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const IDLE_POLL: Duration = Duration::from_millis(100);

enum Command {
    Attach(FrameSink),
    Load { position: i64 },
    Play(Rational64),
    Pause,
    Seek(i64),
    Stop,
    Skipping(bool),
    Shutdown,
}

pub struct SyntheticEngine {
    profile: Profile,
    duration: AtomicI64,
    tx: Sender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticEngine {
    pub fn spawn(profile: Profile, duration: i64) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("synthetic-engine".into())
            .spawn(move || {
                let mut producer = Producer {
                    profile,
                    duration,
                    sink: None,
                    position: 0,
                    speed: Rational64::from_integer(0),
                    skipping: false,
                };
                info!(duration, "Synthetic engine started");
                loop {
                    let wait = producer.tick_interval().unwrap_or(IDLE_POLL);
                    match rx.recv_timeout(wait) {
                        Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Ok(command) => producer.handle(command),
                        Err(RecvTimeoutError::Timeout) => producer.advance(),
                    }
                }
                info!("Synthetic engine stopped");
            })?;
        Ok(Self {
            profile,
            duration: AtomicI64::new(duration),
            tx,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Route produced frames to a monitor.
    pub fn attach(&self, sink: FrameSink) {
        let _ = self.tx.send(Command::Attach(sink));
    }

    fn send(&self, command: Command) -> EngineResult<()> {
        self.tx
            .send(command)
            .map_err(|_| EngineError::new("synthetic engine is not running"))
    }
}

impl PlaybackEngine for SyntheticEngine {
    fn set_producer(
        &self,
        producer: &ProducerHandle,
        _is_active: bool,
        position: Option<i64>,
    ) -> EngineResult<()> {
        debug!(producer = %producer.name, "Synthetic producer loaded");
        self.send(Command::Load {
            position: position.unwrap_or(0),
        })
    }

    fn play(&self, speed: Rational64) -> EngineResult<()> {
        self.send(Command::Play(speed))
    }

    fn pause(&self) -> EngineResult<()> {
        self.send(Command::Pause)
    }

    fn seek(&self, position: i64) -> EngineResult<()> {
        self.send(Command::Seek(position))
    }

    fn stop(&self) -> EngineResult<()> {
        self.send(Command::Stop)
    }

    fn duration(&self) -> i64 {
        self.duration.load(Ordering::Relaxed)
    }

    fn profile(&self) -> Profile {
        self.profile
    }

    fn set_frame_skipping(&self, enabled: bool) -> EngineResult<()> {
        self.send(Command::Skipping(enabled))
    }
}

impl Drop for SyntheticEngine {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("Synthetic engine thread panicked");
            }
        }
    }
}

struct Producer {
    profile: Profile,
    duration: i64,
    sink: Option<FrameSink>,
    position: i64,
    speed: Rational64,
    skipping: bool,
}

impl Producer {
    fn tick_interval(&self) -> Option<Duration> {
        let speed = (*self.speed.numer() as f64 / *self.speed.denom() as f64).abs();
        if speed == 0.0 {
            return None;
        }
        let per_frame = self.profile.frame_rate.frame_interval().as_secs_f64();
        Some(Duration::from_secs_f64(per_frame / speed))
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Attach(sink) => self.sink = Some(sink),
            Command::Load { position } => {
                self.speed = Rational64::from_integer(0);
                self.position = position;
                self.produce();
            }
            Command::Play(speed) => self.speed = speed,
            Command::Pause | Command::Stop => self.speed = Rational64::from_integer(0),
            Command::Seek(position) => {
                self.position = position;
                self.produce();
            }
            Command::Skipping(enabled) => {
                debug!(enabled, "Synthetic engine frame skipping");
                self.skipping = enabled;
            }
            Command::Shutdown => {}
        }
    }

    fn advance(&mut self) {
        let step = if self.skipping { 2 } else { 1 };
        let step = if self.speed < Rational64::from_integer(0) { -step } else { step };
        let next = self.position + step;
        if next < 0 || next >= self.duration {
            self.speed = Rational64::from_integer(0);
            return;
        }
        self.position = next;
        self.produce();
    }

    fn produce(&self) {
        let Some(sink) = &self.sink else {
            return;
        };
        let luma = 16 + (self.position.rem_euclid(220)) as u8;
        let buffer = FrameBuffer::solid_yuv(self.profile.width, self.profile.height, luma, 128, 128);
        let pts = RationalTime::from_frames(self.position, self.profile.frame_rate);
        sink.on_frame_produced(Frame::new(self.position, pts, buffer));
    }
}
