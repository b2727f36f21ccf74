//! Frame renderer: the producer side of the monitor.
//!
//! The playback engine calls [`FrameSink::on_frame_produced`] from its own
//! thread. Accepted frames land in a one-frame inbox (a newer frame replaces
//! an older one that was not picked up yet). The renderer thread takes frames
//! from the inbox, uploads their planes into a free gate slot and publishes
//! the slot for the display.
//!
//! ```text
//!   Idle ─► Receiving ─► Uploading ─► Ready ─► Idle
//!                │            │
//!                └── lost ◄───┘   (unsupported format, failed upload)
//! ```

use crate::config::MonitorConfig;
use crate::controller::PlaybackShared;
use crate::error::{MonitorError, MonitorResult};
use crate::gate::{FrameGate, FrameStamp, GateError, SlotWriter};
use crate::stats::FrameStats;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use cutscope_core::{Frame, FrameBuffer, PixelFormat, RationalTime};
use cutscope_gpu::{Capabilities, FrameLayout, TextureBackend, TextureSet};
use parking_lot::{Condvar, Mutex};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Gate whose slots hold plane textures.
pub type SlotGate = FrameGate<TextureSet>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RendererState {
    Idle = 0,
    Receiving = 1,
    Uploading = 2,
    Ready = 3,
    /// Texture allocation failed repeatedly; waiting for the controller.
    Faulted = 4,
}

impl RendererState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Receiving,
            2 => Self::Uploading,
            3 => Self::Ready,
            4 => Self::Faulted,
            _ => Self::Idle,
        }
    }
}

/// Messages from the renderer and the frame sink to the controller, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// A frame was published to the gate during flush generation `epoch`.
    FrameReady { position: i64, pts: RationalTime, epoch: u64 },
    /// The engine produced the frame an in-flight seek asked for.
    SeekServiced(i64),
    /// The engine produced a frame at or past the end of the play zone.
    ZoneEndReached,
    FrameLost { total: u64 },
    /// Texture allocation keeps failing; playback must stop.
    Fatal(String),
}

#[derive(Default)]
struct Inbox {
    pending: Option<(u64, Frame)>,
    flush_acks: Vec<Sender<()>>,
    shutdown: bool,
}

/// Latest-wins side channel for frame analysis consumers.
struct AnalysisTap {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl AnalysisTap {
    fn offer(&self, frame: Frame) {
        if let Err(TrySendError::Full(frame)) = self.tx.try_send(frame) {
            // replace the stale frame nobody picked up
            let _ = self.rx.try_recv();
            let _ = self.tx.try_send(frame);
        }
    }
}

struct RendererShared {
    inbox: Mutex<Inbox>,
    wake: Condvar,
    idle: Condvar,
    state: AtomicU8,
    gate: Arc<SlotGate>,
    playback: Arc<PlaybackShared>,
    stats: Arc<FrameStats>,
    events: Sender<RendererEvent>,
    analysis: Mutex<Option<AnalysisTap>>,
}

impl RendererShared {
    fn state(&self) -> RendererState {
        RendererState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: RendererState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn emit(&self, event: RendererEvent) {
        let _ = self.events.send(event);
    }
}

/// Engine-facing entry point for produced frames.
#[derive(Clone)]
pub struct FrameSink {
    shared: Arc<RendererShared>,
}

impl FrameSink {
    /// Deliver a produced frame. Called on an engine thread; never blocks on
    /// the renderer or the display.
    pub fn on_frame_produced(&self, frame: Frame) {
        let shared = &self.shared;
        let mut inbox = shared.inbox.lock();
        if inbox.shutdown {
            return;
        }
        let playback = &shared.playback;
        if playback.is_halted() {
            trace!(position = frame.position, "frame after stop discarded");
            return;
        }

        if let Some(target) = playback.seek_target() {
            if frame.position != target {
                trace!(position = frame.position, target, "frame before seek target discarded");
                return;
            }
            if playback.complete_seek(target) {
                shared.emit(RendererEvent::SeekServiced(target));
            }
            if playback.seek_pending() {
                // a newer seek is queued behind this one
                return;
            }
        } else if playback.seek_pending() {
            return;
        }

        if let Some(end) = playback.zone_end() {
            if frame.position >= end {
                if playback.mark_zone_overrun() {
                    debug!(position = frame.position, end, "zone end reached");
                    shared.emit(RendererEvent::ZoneEndReached);
                }
                return;
            }
        }

        let ticket = shared.gate.ticket();
        shared.stats.record_received();
        if inbox.pending.replace((ticket, frame)).is_some() {
            shared.stats.record_superseded();
        }
        drop(inbox);
        shared.wake.notify_one();
    }
}

/// Settings the renderer thread runs with.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub capabilities: Capabilities,
    pub max_allocation_failures: u32,
    pub slot_wait: Duration,
    pub shutdown_timeout: Duration,
}

impl RendererSettings {
    pub fn from_config(config: &MonitorConfig, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            max_allocation_failures: config.max_allocation_failures,
            slot_wait: config.slot_wait(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Cloneable handle for flushing and observing the renderer.
#[derive(Clone)]
pub struct RendererControl {
    shared: Arc<RendererShared>,
    timeout: Duration,
}

impl RendererControl {
    pub fn state(&self) -> RendererState {
        self.shared.state()
    }

    /// Drop the pending frame and everything published but not displayed,
    /// then wait until the renderer thread is idle.
    pub fn flush(&self) -> MonitorResult<()> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        {
            let mut inbox = self.shared.inbox.lock();
            if inbox.shutdown {
                return Ok(());
            }
            if inbox.pending.take().is_some() {
                self.shared.stats.record_superseded();
            }
            self.shared.gate.flush();
            inbox.flush_acks.push(ack_tx);
        }
        self.shared.wake.notify_one();

        match ack_rx.recv_timeout(self.timeout) {
            Ok(()) => {
                debug!("Frame renderer flushed");
                Ok(())
            }
            Err(_) => {
                let ms = self.timeout.as_millis() as u64;
                error!(timeout_ms = ms, "Frame renderer did not acknowledge flush");
                Err(MonitorError::RendererStalled(ms))
            }
        }
    }

    /// Wait until no frame is pending or being uploaded.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inbox = self.shared.inbox.lock();
        loop {
            let busy = inbox.pending.is_some()
                || !matches!(self.shared.state(), RendererState::Idle | RendererState::Faulted);
            if !busy {
                return true;
            }
            if self.shared.idle.wait_until(&mut inbox, deadline).timed_out() {
                return false;
            }
        }
    }
}

/// Handle to the renderer thread.
pub struct FrameRenderer {
    control: RendererControl,
    thread: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl FrameRenderer {
    pub fn spawn(
        gate: Arc<SlotGate>,
        backend: Arc<dyn TextureBackend>,
        playback: Arc<PlaybackShared>,
        stats: Arc<FrameStats>,
        events: Sender<RendererEvent>,
        settings: RendererSettings,
    ) -> MonitorResult<Self> {
        let shared = Arc::new(RendererShared {
            inbox: Mutex::new(Inbox::default()),
            wake: Condvar::new(),
            idle: Condvar::new(),
            state: AtomicU8::new(RendererState::Idle as u8),
            gate,
            playback,
            stats,
            events,
            analysis: Mutex::new(None),
        });

        let (done_tx, done) = crossbeam_channel::bounded::<()>(1);
        let timeout = settings.shutdown_timeout;
        let thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("cutscope-renderer".into())
                .spawn(move || {
                    let _done = done_tx;
                    info!("Frame renderer started");
                    RenderLoop {
                        shared,
                        backend,
                        settings,
                        allocation_failures: 0,
                    }
                    .run();
                    info!("Frame renderer exiting");
                })?
        };

        Ok(Self {
            control: RendererControl { shared, timeout },
            thread: Some(thread),
            done,
        })
    }

    pub fn sink(&self) -> FrameSink {
        FrameSink {
            shared: Arc::clone(&self.control.shared),
        }
    }

    pub fn control(&self) -> RendererControl {
        self.control.clone()
    }

    pub fn state(&self) -> RendererState {
        self.control.state()
    }

    pub fn gate(&self) -> &Arc<SlotGate> {
        &self.control.shared.gate
    }

    pub fn flush(&self) -> MonitorResult<()> {
        self.control.flush()
    }

    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.control.wait_until_idle(timeout)
    }

    /// Start offering every published frame to a latest-wins analysis channel.
    pub fn enable_analysis(&self) -> Receiver<Frame> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        *self.control.shared.analysis.lock() = Some(AnalysisTap { tx, rx: rx.clone() });
        rx
    }

    pub fn disable_analysis(&self) {
        *self.control.shared.analysis.lock() = None;
    }

    /// Stop the thread, waiting at most the configured shutdown timeout.
    pub fn shutdown(&mut self) -> MonitorResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let shared = &self.control.shared;
        shared.inbox.lock().shutdown = true;
        shared.gate.close();
        shared.wake.notify_all();

        match self.done.recv_timeout(self.control.timeout) {
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                let timeout_ms = self.control.timeout.as_millis() as u64;
                error!(timeout_ms, "Frame renderer did not stop in time");
                return Err(MonitorError::ShutdownTimeout {
                    worker: "renderer".into(),
                    timeout_ms,
                });
            }
            Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {}
        }
        thread
            .join()
            .map_err(|_| MonitorError::WorkerPanicked("renderer".into()))
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Frame renderer shutdown failed: {e}");
        }
    }
}

struct RenderLoop {
    shared: Arc<RendererShared>,
    backend: Arc<dyn TextureBackend>,
    settings: RendererSettings,
    allocation_failures: u32,
}

impl RenderLoop {
    fn run(mut self) {
        while let Some((ticket, frame, epoch)) = self.next_frame() {
            self.render(ticket, frame, epoch);
        }
    }

    /// Block until a frame arrives. `None` on shutdown.
    fn next_frame(&self) -> Option<(u64, Frame, u64)> {
        let shared = &self.shared;
        let mut inbox = shared.inbox.lock();
        loop {
            if inbox.pending.is_none() && shared.state() != RendererState::Faulted {
                shared.set_state(RendererState::Idle);
            }
            // acknowledged only once the state no longer shows the flushed frame
            for ack in inbox.flush_acks.drain(..) {
                let _ = ack.send(());
            }
            if inbox.shutdown {
                return None;
            }
            if let Some((ticket, frame)) = inbox.pending.take() {
                shared.set_state(RendererState::Receiving);
                return Some((ticket, frame, shared.gate.epoch()));
            }
            shared.idle.notify_all();
            shared.wake.wait(&mut inbox);
        }
    }

    fn render(&mut self, ticket: u64, frame: Frame, epoch: u64) {
        let buffer = match self.prepare(&frame) {
            Ok(buffer) => buffer,
            Err(reason) => {
                self.lose(ticket, frame.position, &reason);
                return;
            }
        };
        let layout = match FrameLayout::for_buffer(&buffer)
            .and_then(|layout| layout.check(&self.settings.capabilities).map(|()| layout))
        {
            Ok(layout) => layout,
            Err(e) => {
                self.lose(ticket, frame.position, &e.to_string());
                return;
            }
        };

        let gate = Arc::clone(&self.shared.gate);
        let Some(mut slot) = Self::acquire(&gate, &self.shared, self.settings.slot_wait, epoch) else {
            return;
        };
        self.shared.set_state(RendererState::Uploading);

        match slot.ensure(self.backend.as_ref(), &layout) {
            Ok(reallocated) => {
                if reallocated {
                    self.shared.stats.record_reallocation();
                    debug!(
                        slot = slot.slot(),
                        width = layout.width,
                        height = layout.height,
                        "slot textures reallocated"
                    );
                }
                if self.allocation_failures > 0 {
                    info!("Texture allocation recovered");
                }
                self.allocation_failures = 0;
            }
            Err(e) if e.is_out_of_memory() => {
                drop(slot);
                self.allocation_failure(ticket, frame.position, e.to_string());
                return;
            }
            Err(e) => {
                drop(slot);
                self.lose(ticket, frame.position, &e.to_string());
                return;
            }
        }

        if let Err(e) = slot.upload(self.backend.as_ref(), &buffer) {
            drop(slot);
            warn!(position = frame.position, "Texture upload failed: {e}");
            self.lose(ticket, frame.position, "upload failed");
            return;
        }

        let stamp = FrameStamp {
            seq: ticket,
            position: frame.position,
            pts: frame.pts,
        };
        if !slot.publish(stamp) {
            trace!(position = frame.position, "stale frame discarded after upload");
            return;
        }
        self.shared.set_state(RendererState::Ready);
        self.shared.stats.record_uploaded();
        self.shared.emit(RendererEvent::FrameReady {
            position: frame.position,
            pts: frame.pts,
            epoch,
        });
        if let Some(tap) = self.shared.analysis.lock().as_ref() {
            tap.offer(frame);
        }
    }

    /// Validate the pixel data and convert formats the pipeline can expand.
    fn prepare<'f>(&self, frame: &'f Frame) -> Result<Cow<'f, FrameBuffer>, String> {
        frame.buffer.validate().map_err(|e| e.to_string())?;
        match frame.format() {
            PixelFormat::Gray8 => frame
                .buffer
                .gray_to_rgba8()
                .map(Cow::Owned)
                .map_err(|e| e.to_string()),
            _ => Ok(Cow::Borrowed(frame.buffer.as_ref())),
        }
    }

    /// Wait for a free slot. Gives up when the frame went stale.
    fn acquire<'g>(
        gate: &'g SlotGate,
        shared: &RendererShared,
        wait: Duration,
        epoch: u64,
    ) -> Option<SlotWriter<'g, TextureSet>> {
        loop {
            match gate.acquire_slot(epoch, wait) {
                Ok(slot) => return Some(slot),
                Err(GateError::Timeout) => {
                    let inbox = shared.inbox.lock();
                    if inbox.shutdown || !inbox.flush_acks.is_empty() {
                        return None;
                    }
                    if inbox.pending.is_some() {
                        // a newer frame is waiting; this one will never be shown
                        shared.stats.record_superseded();
                        return None;
                    }
                }
                Err(GateError::Flushed) | Err(GateError::Closed) => return None,
            }
        }
    }

    /// Count a lost frame. Its ticket is retired so the display does not
    /// report it as dropped.
    fn lose(&self, ticket: u64, position: i64, reason: &str) {
        self.shared.gate.retire(ticket);
        let total = self.shared.stats.record_lost();
        debug!(position, total, "Frame lost: {reason}");
        self.shared.emit(RendererEvent::FrameLost { total });
    }

    fn allocation_failure(&mut self, ticket: u64, position: i64, reason: String) {
        self.allocation_failures += 1;
        warn!(
            position,
            failures = self.allocation_failures,
            "Texture allocation failed: {reason}"
        );
        self.lose(ticket, position, "allocation failed");
        if self.allocation_failures >= self.settings.max_allocation_failures {
            error!("Texture allocation keeps failing, renderer faulted");
            // a retry after the controller stopped gets the full allowance again
            self.allocation_failures = 0;
            self.shared.set_state(RendererState::Faulted);
            self.shared.emit(RendererEvent::Fatal(reason));
        }
    }
}
