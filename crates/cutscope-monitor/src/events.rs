//! Notifications from the monitor to UI chrome.
//!
//! Events travel over an unbounded FIFO channel so position notifications keep
//! their order. Frame payloads never travel here; they go through the gate.

use cutscope_core::{Rect, RationalTime, Vec2};
use crossbeam_channel::{Receiver, Sender};
use num_rational::Rational64;

/// Keyboard modifiers held during a pointer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        shift: false,
        alt: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        shift: false,
        alt: false,
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A frame was uploaded and is ready for the next paint.
    FrameDisplayed { position: i64, pts: RationalTime },
    PositionChanged(i64),
    Started,
    Paused,
    Playing { speed: Rational64 },
    /// Playback stopped; `error` is set when the engine or the GPU failed.
    Stopped { error: Option<String> },
    ZoomChanged(f32),
    OffsetChanged(Vec2),
    /// The letterboxed display rectangle moved or resized.
    RectChanged(Rect),
    DroppedFramesChanged(u64),
    /// Lost frames crossed the configured threshold.
    FrameLoss { lost: u64 },
    /// Wheel scrubbing request; the receiver decides how far to seek.
    MouseSeek { delta: i32, modifiers: Modifiers },
    Error(String),
}

pub type EventSender = Sender<MonitorEvent>;
pub type EventReceiver = Receiver<MonitorEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    crossbeam_channel::unbounded()
}

/// Send, ignoring a receiver that has gone away.
pub(crate) fn emit(tx: &EventSender, event: MonitorEvent) {
    let _ = tx.send(event);
}
