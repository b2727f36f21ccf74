//! Playback controller: the single writer of playback state.
//!
//! Transport commands (`play`, `pause`, `seek`, zone play, `stop`) run on the
//! UI thread. The few facts the engine-side frame sink needs to filter frames
//! (in-flight seek target, zone end, halted) are published through
//! [`PlaybackShared`] atomics, which only the controller writes.
//!
//! Seeks are coalesced: while one seek is being serviced by the engine, newer
//! targets overwrite a single pending slot, and only the last one is issued
//! once the engine reports completion.

use crate::config::DropFrameConfig;
use crate::engine::{EngineError, PlaybackEngine, ProducerHandle};
use crate::error::{MonitorError, MonitorResult};
use crate::events::{emit, EventSender, MonitorEvent};
use crate::proxy::{Marker, MonitorProxy};
use crate::renderer::RendererControl;
use crate::stats::FrameStats;
use cutscope_core::{RationalTime, Zone};
use num_rational::Rational64;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const NO_SEEK: i64 = i64::MIN;
const NO_ZONE: i64 = i64::MAX;

/// Playback facts read by the frame sink on engine threads.
#[derive(Debug)]
pub struct PlaybackShared {
    seek_target: AtomicI64,
    seek_pending: AtomicBool,
    zone_end: AtomicI64,
    zone_overrun: AtomicBool,
    halted: AtomicBool,
}

impl Default for PlaybackShared {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackShared {
    pub fn new() -> Self {
        Self {
            seek_target: AtomicI64::new(NO_SEEK),
            seek_pending: AtomicBool::new(false),
            zone_end: AtomicI64::new(NO_ZONE),
            zone_overrun: AtomicBool::new(false),
            halted: AtomicBool::new(false),
        }
    }

    /// Position the in-flight seek is waiting for.
    pub fn seek_target(&self) -> Option<i64> {
        let target = self.seek_target.load(Ordering::SeqCst);
        (target != NO_SEEK).then_some(target)
    }

    /// Whether another seek is queued behind the in-flight one.
    pub fn seek_pending(&self) -> bool {
        self.seek_pending.load(Ordering::SeqCst)
    }

    pub fn zone_end(&self) -> Option<i64> {
        let end = self.zone_end.load(Ordering::SeqCst);
        (end != NO_ZONE).then_some(end)
    }

    /// Frames are refused while stopped.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_seek(&self, target: i64) {
        self.seek_target.store(target, Ordering::SeqCst);
        self.seek_pending.store(false, Ordering::SeqCst);
        self.halted.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_seek_pending(&self, pending: bool) {
        self.seek_pending.store(pending, Ordering::SeqCst);
    }

    /// Mark the seek to `target` as serviced. `false` if it was not in flight.
    pub(crate) fn complete_seek(&self, target: i64) -> bool {
        self.seek_target
            .compare_exchange(target, NO_SEEK, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn clear_seek(&self) {
        self.seek_target.store(NO_SEEK, Ordering::SeqCst);
        self.seek_pending.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_zone_end(&self, end: Option<i64>) {
        self.zone_end.store(end.unwrap_or(NO_ZONE), Ordering::SeqCst);
        self.zone_overrun.store(false, Ordering::SeqCst);
    }

    /// Returns `true` the first time the zone end is crossed.
    pub(crate) fn mark_zone_overrun(&self) -> bool {
        !self.zone_overrun.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn reset_zone_overrun(&self) {
        self.zone_overrun.store(false, Ordering::SeqCst);
    }

    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Paused,
    Playing,
}

/// Transport state of one monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub position: i64,
    /// Zero when not playing; negative plays backwards.
    pub speed: Rational64,
    /// Loop back to the zone start instead of stopping at its end.
    pub loop_zone: bool,
    pub zone: Option<Zone>,
    /// Playback is currently restricted to `zone`.
    pub zone_playing: bool,
    pub drop_frames: bool,
    pub status: PlaybackStatus,
    /// Set when the engine or the GPU stopped playback.
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position: 0,
            speed: Rational64::from_integer(0),
            loop_zone: false,
            zone: None,
            zone_playing: false,
            drop_frames: true,
            status: PlaybackStatus::Stopped,
            error: None,
        }
    }
}

/// Decides when the engine should skip decoding.
///
/// Each presented frame closes one step of a window of `window_frames`. Once
/// `threshold` frames were dropped inside a window, skipping is switched on;
/// it is switched off again after a full window without drops.
#[derive(Debug, Clone)]
pub struct DropFramePolicy {
    config: DropFrameConfig,
    presented: u32,
    dropped: u64,
    skipping: bool,
}

impl DropFramePolicy {
    pub fn new(config: DropFrameConfig) -> Self {
        Self {
            config,
            presented: 0,
            dropped: 0,
            skipping: false,
        }
    }

    pub fn is_skipping(&self) -> bool {
        self.skipping
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Record one presented frame and how many were skipped before it.
    /// Returns the new skipping state when it changes.
    pub fn record(&mut self, skipped: u64) -> Option<bool> {
        self.presented += 1;
        self.dropped += skipped;

        if self.config.enabled && !self.skipping && self.dropped >= u64::from(self.config.threshold) {
            self.skipping = true;
            self.reset_window();
            return Some(true);
        }
        if self.presented >= self.config.window_frames {
            let clean = self.dropped == 0;
            self.reset_window();
            if self.skipping && clean {
                self.skipping = false;
                return Some(false);
            }
        }
        None
    }

    /// Returns `Some(false)` if disabling ends active skipping.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<bool> {
        self.config.enabled = enabled;
        self.reset_window();
        if !enabled && self.skipping {
            self.skipping = false;
            return Some(false);
        }
        None
    }

    fn reset_window(&mut self) {
        self.presented = 0;
        self.dropped = 0;
    }
}

/// Orchestrates the playback engine on behalf of the monitor.
pub struct PlaybackController {
    engine: Arc<dyn PlaybackEngine>,
    shared: Arc<PlaybackShared>,
    renderer: RendererControl,
    proxy: MonitorProxy,
    stats: Arc<FrameStats>,
    events: EventSender,
    state: PlaybackState,
    producer: Option<ProducerHandle>,
    duration: i64,
    seek_in_flight: Option<i64>,
    pending_seek: Option<i64>,
    last_reported: Option<i64>,
    drop_policy: DropFramePolicy,
    lost_threshold: u64,
    window_frames: u32,
    window_presented: u32,
    window_lost: u64,
    loss_reported: bool,
}

impl PlaybackController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        shared: Arc<PlaybackShared>,
        renderer: RendererControl,
        proxy: MonitorProxy,
        stats: Arc<FrameStats>,
        events: EventSender,
        drop_frames: DropFrameConfig,
        lost_threshold: u64,
    ) -> Self {
        let state = PlaybackState {
            drop_frames: drop_frames.enabled,
            ..PlaybackState::default()
        };
        Self {
            engine,
            shared,
            renderer,
            proxy,
            stats,
            events,
            state,
            producer: None,
            duration: 0,
            seek_in_flight: None,
            pending_seek: None,
            last_reported: None,
            window_frames: drop_frames.window_frames,
            drop_policy: DropFramePolicy::new(drop_frames),
            lost_threshold,
            window_presented: 0,
            window_lost: 0,
            loss_reported: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn position(&self) -> i64 {
        self.state.position
    }

    pub fn speed(&self) -> Rational64 {
        self.state.speed
    }

    pub fn is_playing(&self) -> bool {
        self.state.status == PlaybackStatus::Playing
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn producer(&self) -> Option<&ProducerHandle> {
        self.producer.as_ref()
    }

    /// Target the engine is currently seeking to.
    pub fn seek_in_flight(&self) -> Option<i64> {
        self.seek_in_flight
    }

    /// Target queued behind the in-flight seek.
    pub fn pending_seek(&self) -> Option<i64> {
        self.pending_seek
    }

    pub fn drop_policy(&self) -> &DropFramePolicy {
        &self.drop_policy
    }

    /// Swap the producer. Playback state is reset; the playhead is parked at
    /// `position` if given.
    pub fn set_producer(
        &mut self,
        producer: ProducerHandle,
        is_active: bool,
        position: Option<i64>,
    ) -> MonitorResult<()> {
        info!(producer = %producer.name, is_active, ?position, "Setting producer");
        self.shared.clear_seek();
        self.shared.set_zone_end(None);
        self.renderer.flush()?;
        if let Err(e) = self.engine.set_producer(&producer, is_active, position) {
            return Err(self.fail("set_producer", e));
        }

        self.duration = self.engine.duration().max(0);
        let position = clamp_position(position.unwrap_or(0), self.duration);
        self.state = PlaybackState {
            position,
            drop_frames: self.state.drop_frames,
            status: PlaybackStatus::Paused,
            ..PlaybackState::default()
        };
        self.producer = Some(producer);
        self.seek_in_flight = None;
        self.pending_seek = None;
        self.last_reported = None;
        self.shared.resume();
        // markers belong to the previous producer
        self.proxy.reset();
        self.proxy.set_duration(self.duration);
        self.proxy.set_position(position);
        self.proxy.set_frame_rate(self.engine.profile().frame_rate);
        Ok(())
    }

    /// Start playing at `speed`. A zero speed pauses.
    pub fn play(&mut self, speed: Rational64) -> MonitorResult<()> {
        self.require_producer("play")?;
        if speed == Rational64::from_integer(0) {
            return self.pause();
        }
        self.shared.resume();
        if let Err(e) = self.engine.play(speed) {
            return Err(self.fail("play", e));
        }
        let was_playing = self.is_playing();
        self.state.speed = speed;
        self.state.status = PlaybackStatus::Playing;
        self.state.error = None;
        debug!(%speed, "Playing");
        if !was_playing {
            emit(&self.events, MonitorEvent::Started);
        }
        emit(&self.events, MonitorEvent::Playing { speed });
        Ok(())
    }

    /// Pause playback. Pausing while not playing changes nothing.
    pub fn pause(&mut self) -> MonitorResult<()> {
        if self.producer.is_none() || !self.is_playing() {
            return Ok(());
        }
        if let Err(e) = self.engine.pause() {
            return Err(self.fail("pause", e));
        }
        self.state.speed = Rational64::from_integer(0);
        self.state.status = PlaybackStatus::Paused;
        debug!(position = self.state.position, "Paused");
        emit(&self.events, MonitorEvent::Paused);
        Ok(())
    }

    /// Play if `play` is set, pause otherwise.
    pub fn switch_play(&mut self, play: bool) -> MonitorResult<()> {
        if play {
            self.play(Rational64::from_integer(1))
        } else {
            self.pause()
        }
    }

    /// Seek to `position`, clamped to `[0, duration - 1]`.
    ///
    /// While an earlier seek is still being serviced, the target replaces any
    /// queued one instead of reaching the engine.
    pub fn seek(&mut self, position: i64) -> MonitorResult<()> {
        if self.producer.is_none() {
            error!(position, "Seek requested without a producer");
            return Err(MonitorError::Protocol(format!(
                "seek to {position} with no producer loaded"
            )));
        }
        let target = clamp_position(position, self.duration);
        if self.seek_in_flight.is_some() {
            debug!(target, "Seek coalesced");
            self.pending_seek = Some(target);
            self.shared.set_seek_pending(true);
            return Ok(());
        }
        self.issue_seek(target)
    }

    /// Ask the engine to render the current frame again.
    pub fn request_refresh(&mut self) -> MonitorResult<()> {
        if self.producer.is_none() || self.is_playing() {
            return Ok(());
        }
        self.seek(self.state.position)
    }

    /// Set or clear the zone used by [`play_zone`](Self::play_zone).
    pub fn set_zone(&mut self, zone: Option<Zone>) {
        let zone = zone.map(|z| z.clamped(self.duration)).filter(|z| !z.is_empty());
        self.state.zone = zone;
        self.proxy.set_zone(zone);
        if self.state.zone_playing {
            match zone {
                Some(zone) => self.shared.set_zone_end(Some(zone.end)),
                None => self.leave_zone(),
            }
        }
    }

    /// Play the zone from its start (or from the playhead if already inside
    /// it). Returns `false` when there is no usable zone.
    pub fn play_zone(&mut self, loop_zone: bool) -> MonitorResult<bool> {
        self.require_producer("play_zone")?;
        let Some(zone) = self.state.zone.filter(|z| !z.is_empty()) else {
            return Ok(false);
        };
        self.state.loop_zone = loop_zone;
        self.state.zone_playing = true;
        self.shared.set_zone_end(Some(zone.end));
        if !zone.contains(self.state.position) || zone.last_frame() == Some(self.state.position) {
            self.seek(zone.start)?;
        }
        self.play(Rational64::from_integer(1))?;
        info!(start = zone.start, end = zone.end, loop_zone, "Zone playback");
        Ok(true)
    }

    /// Loop over the whole producer.
    pub fn loop_clip(&mut self) -> MonitorResult<bool> {
        self.require_producer("loop_clip")?;
        self.set_zone(Some(Zone::new(0, self.duration)));
        self.play_zone(true)
    }

    /// Stop playback. Returns once the renderer has flushed and is idle.
    pub fn stop(&mut self) -> MonitorResult<()> {
        if self.producer.is_none() {
            return Ok(());
        }
        if let Err(e) = self.halt_session()? {
            return Err(self.fail("stop", e));
        }
        info!(position = self.state.position, "Stopped");
        emit(&self.events, MonitorEvent::Stopped { error: None });
        Ok(())
    }

    /// Halt ingress, stop the engine and flush the renderer without
    /// announcing it. The inner result is the engine's.
    fn halt_session(&mut self) -> MonitorResult<Result<(), EngineError>> {
        self.shared.halt();
        self.shared.clear_seek();
        self.seek_in_flight = None;
        self.pending_seek = None;
        let engine_result = self.engine.stop();
        self.renderer.flush()?;
        self.leave_zone();
        self.state.speed = Rational64::from_integer(0);
        self.state.status = PlaybackStatus::Stopped;
        Ok(engine_result)
    }

    pub fn set_drop_frames(&mut self, enabled: bool) -> MonitorResult<()> {
        self.state.drop_frames = enabled;
        if let Some(skipping) = self.drop_policy.set_enabled(enabled) {
            self.apply_frame_skipping(skipping)?;
        }
        Ok(())
    }

    /// Publish duration and markers to the ruler.
    pub fn set_ruler_info(&mut self, duration: i64, markers: Vec<Marker>) {
        self.duration = duration.max(0);
        self.proxy.set_ruler_info(self.duration, markers);
    }

    /// A frame reached the gate. Updates the playhead and handles zone ends.
    pub fn on_frame_ready(&mut self, position: i64, pts: RationalTime) -> MonitorResult<()> {
        emit(&self.events, MonitorEvent::FrameDisplayed { position, pts });
        self.state.position = position;
        self.proxy.set_position(position);
        if self.last_reported != Some(position) {
            self.last_reported = Some(position);
            emit(&self.events, MonitorEvent::PositionChanged(position));
        }

        if self.state.zone_playing && self.is_playing() {
            if let Some(last) = self.state.zone.and_then(Zone::last_frame) {
                if self.state.speed > Rational64::from_integer(0) && position >= last {
                    return self.on_zone_end();
                }
            }
        }
        Ok(())
    }

    /// The engine produced the frame the in-flight seek asked for.
    pub fn on_seek_serviced(&mut self, position: i64) -> MonitorResult<()> {
        if self.seek_in_flight != Some(position) {
            return Ok(());
        }
        self.seek_in_flight = None;
        match self.pending_seek.take() {
            Some(next) => self.issue_seek(next),
            None => Ok(()),
        }
    }

    /// Playback reached the end of the zone.
    pub fn on_zone_end(&mut self) -> MonitorResult<()> {
        if !self.state.zone_playing {
            return Ok(());
        }
        let Some(zone) = self.state.zone else {
            self.leave_zone();
            return Ok(());
        };
        if self.state.loop_zone {
            let already_looping =
                self.seek_in_flight == Some(zone.start) || self.pending_seek == Some(zone.start);
            if !already_looping {
                debug!(start = zone.start, "Zone loop");
                self.seek(zone.start)?;
            }
            Ok(())
        } else {
            self.leave_zone();
            self.pause()
        }
    }

    /// A paint presented a new frame after skipping `skipped` others.
    pub fn on_frame_presented(&mut self, skipped: u64) -> MonitorResult<()> {
        self.window_presented += 1;
        if self.window_presented >= self.window_frames {
            self.window_presented = 0;
            self.window_lost = 0;
            self.loss_reported = false;
        }
        if let Some(skipping) = self.drop_policy.record(skipped) {
            self.apply_frame_skipping(skipping)?;
        }
        Ok(())
    }

    /// The renderer lost a frame. Raised to the UI only past the threshold.
    pub fn on_frame_lost(&mut self, total: u64) {
        self.window_lost += 1;
        if self.window_lost > self.lost_threshold && !self.loss_reported {
            self.loss_reported = true;
            warn!(lost = total, "Sustained frame loss");
            emit(&self.events, MonitorEvent::FrameLoss { lost: total });
        }
    }

    /// The renderer cannot allocate textures any more; stop the session.
    pub fn on_fatal(&mut self, reason: String) -> MonitorError {
        error!("Stopping playback after renderer failure: {reason}");
        if self.producer.is_some() {
            match self.halt_session() {
                Ok(Err(e)) => warn!("Engine stop after renderer failure failed: {e}"),
                Err(e) => warn!("Stop after renderer failure failed: {e}"),
                Ok(Ok(())) => {}
            }
        }
        self.state.status = PlaybackStatus::Stopped;
        self.state.error = Some(reason.clone());
        emit(
            &self.events,
            MonitorEvent::Stopped {
                error: Some(reason.clone()),
            },
        );
        emit(&self.events, MonitorEvent::Error(reason.clone()));
        MonitorError::ResourceExhausted(reason)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.stats.dropped()
    }

    pub fn reset_drops(&mut self) {
        self.stats.reset_drops();
        emit(&self.events, MonitorEvent::DroppedFramesChanged(0));
    }

    fn issue_seek(&mut self, target: i64) -> MonitorResult<()> {
        self.shared.begin_seek(target);
        self.shared.reset_zone_overrun();
        self.seek_in_flight = Some(target);
        debug!(target, "Seek issued");
        if let Err(e) = self.engine.seek(target) {
            self.shared.clear_seek();
            self.seek_in_flight = None;
            self.pending_seek = None;
            return Err(self.fail("seek", e));
        }
        Ok(())
    }

    fn apply_frame_skipping(&mut self, skipping: bool) -> MonitorResult<()> {
        info!(skipping, "Frame skipping changed");
        self.engine
            .set_frame_skipping(skipping)
            .map_err(|e| self.fail("set_frame_skipping", e))
    }

    fn leave_zone(&mut self) {
        self.state.zone_playing = false;
        self.shared.set_zone_end(None);
    }

    fn require_producer(&self, command: &str) -> MonitorResult<()> {
        if self.producer.is_some() {
            return Ok(());
        }
        error!(command, "Transport command without a producer");
        Err(MonitorError::Protocol(format!("{command} with no producer loaded")))
    }

    /// Record an engine refusal: playback is stopped with the error flag set.
    fn fail(&mut self, command: &'static str, e: EngineError) -> MonitorError {
        error!(command, "Playback engine error: {e}");
        self.shared.clear_seek();
        self.seek_in_flight = None;
        self.pending_seek = None;
        self.state.speed = Rational64::from_integer(0);
        self.state.status = PlaybackStatus::Stopped;
        self.state.error = Some(e.to_string());
        emit(
            &self.events,
            MonitorEvent::Stopped {
                error: Some(e.to_string()),
            },
        );
        MonitorError::Engine {
            command,
            reason: e.0,
        }
    }
}

fn clamp_position(position: i64, duration: i64) -> i64 {
    position.clamp(0, (duration - 1).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(threshold: u32, window_frames: u32) -> DropFramePolicy {
        DropFramePolicy::new(DropFrameConfig {
            enabled: true,
            threshold,
            window_frames,
        })
    }

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(500, 1000), 500);
        assert_eq!(clamp_position(-3, 1000), 0);
        assert_eq!(clamp_position(5000, 1000), 999);
        assert_eq!(clamp_position(42, 0), 0);
    }

    #[test]
    fn test_policy_switches_on_at_threshold() {
        let mut p = policy(5, 25);
        assert_eq!(p.record(2), None);
        assert_eq!(p.record(3), Some(true));
        assert!(p.is_skipping());
    }

    #[test]
    fn test_policy_releases_after_clean_window() {
        let mut p = policy(1, 4);
        assert_eq!(p.record(1), Some(true));
        for _ in 0..3 {
            assert_eq!(p.record(0), None);
        }
        assert_eq!(p.record(0), Some(false));
    }

    #[test]
    fn test_policy_stays_on_while_dropping() {
        let mut p = policy(1, 2);
        p.record(1);
        p.record(1);
        assert_eq!(p.record(0), None);
        assert!(p.is_skipping());
    }

    #[test]
    fn test_disabled_policy_never_skips() {
        let mut p = policy(1, 4);
        p.set_enabled(false);
        assert_eq!(p.record(10), None);
        assert!(!p.is_skipping());
    }

    #[test]
    fn test_shared_seek_completion_is_single_shot() {
        let shared = PlaybackShared::new();
        shared.begin_seek(10);
        assert_eq!(shared.seek_target(), Some(10));
        assert!(!shared.complete_seek(11));
        assert!(shared.complete_seek(10));
        assert!(!shared.complete_seek(10));
        assert_eq!(shared.seek_target(), None);
    }

    #[test]
    fn test_zone_overrun_flag_fires_once_per_zone() {
        let shared = PlaybackShared::new();
        shared.set_zone_end(Some(5));
        assert!(shared.mark_zone_overrun());
        assert!(!shared.mark_zone_overrun());
        shared.set_zone_end(Some(5));
        assert!(shared.mark_zone_overrun());
    }
}
