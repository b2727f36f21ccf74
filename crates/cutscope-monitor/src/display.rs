//! Display surface: the consumer side of the monitor.
//!
//! [`DisplaySurface::paint`] runs on the UI thread at the refresh rate. It
//! takes the newest published slot from the gate (or keeps the one already on
//! screen), composes zoom, pan and the effect comparison rectangle into a
//! [`DrawCommand`] and hands it to the presenter. Painting never waits for
//! the renderer.
//!
//! View state lives here: the letterboxed display rectangle inside the widget,
//! the zoom factor and the pan offset. Offsets are measured in frame pixels
//! from the frame centre.

use crate::error::MonitorResult;
use crate::events::{emit, EventSender, Modifiers, MonitorEvent};
use crate::gate::FrameStamp;
use crate::renderer::SlotGate;
use crate::stats::FrameStats;
use cutscope_core::{Profile, Rect, Transform2D, Vec2};
use cutscope_gpu::{DrawCommand, FrameDraw, Presenter};
use std::sync::Arc;
use tracing::{debug, trace};

/// What a single paint did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaintOutcome {
    /// Set when a newly published frame went on screen.
    pub new_frame: Option<FrameStamp>,
    /// Frames published since the previous new frame that were never shown.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy)]
struct DragAnchor {
    cursor: Vec2,
    offset: Vec2,
}

pub struct DisplaySurface {
    gate: Arc<SlotGate>,
    presenter: Box<dyn Presenter>,
    stats: Arc<FrameStats>,
    events: EventSender,
    profile: Profile,
    surface_size: (u32, u32),
    display_rect: Rect,
    zoom: f32,
    offset: Vec2,
    min_zoom: f32,
    max_zoom: f32,
    effect_rect: Option<Rect>,
    drag: Option<DragAnchor>,
}

impl DisplaySurface {
    pub fn new(
        gate: Arc<SlotGate>,
        presenter: Box<dyn Presenter>,
        stats: Arc<FrameStats>,
        events: EventSender,
        profile: Profile,
        zoom_range: (f32, f32),
    ) -> Self {
        Self {
            gate,
            presenter,
            stats,
            events,
            profile,
            surface_size: (0, 0),
            display_rect: Rect::default(),
            zoom: 1.0,
            offset: Vec2::ZERO,
            min_zoom: zoom_range.0,
            max_zoom: zoom_range.1,
            effect_rect: None,
            drag: None,
        }
    }

    /// Show the newest frame, or repaint the current one.
    pub fn paint(&mut self) -> MonitorResult<PaintOutcome> {
        let mut outcome = PaintOutcome::default();
        if let Some(consumed) = self.gate.consume_ready() {
            self.stats.record_presented();
            if consumed.skipped > 0 {
                let total = self.stats.record_dropped(consumed.skipped);
                debug!(skipped = consumed.skipped, total, "Frames dropped before display");
                emit(&self.events, MonitorEvent::DroppedFramesChanged(total));
            }
            trace!(position = consumed.stamp.position, slot = consumed.slot, "New frame on screen");
            outcome.new_frame = Some(consumed.stamp);
            outcome.skipped = consumed.skipped;
        }

        let command = self.compose();
        self.presenter.present(&command)?;
        Ok(outcome)
    }

    /// Build the draw command for the slot currently on screen.
    pub fn compose(&self) -> DrawCommand {
        let mut command = DrawCommand::blank(self.surface_size, self.display_rect);
        command.transform = self.view_transform();
        command.color_matrix = self.profile.color_matrix;
        command.effect_rect = self
            .effect_rect
            .map(|rect| rect.normalized_in(self.frame_rect()));
        command.frame = self
            .gate
            .with_displayed(|set, stamp| {
                set.layout().map(|layout| FrameDraw {
                    position: stamp.position,
                    layout: layout.layout,
                    textures: set.ids().iter().copied().collect(),
                })
            })
            .flatten();
        command
    }

    /// The widget was resized.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
        self.update_display_rect();
    }

    /// A new profile changes the frame aspect and size.
    pub fn set_profile(&mut self, profile: Profile) {
        self.profile = profile;
        self.effect_rect = None;
        self.update_display_rect();
        self.set_offset(self.offset);
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        let zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        if zoom == self.zoom {
            return;
        }
        self.zoom = zoom;
        debug!(zoom, "Zoom changed");
        emit(&self.events, MonitorEvent::ZoomChanged(zoom));
        self.set_offset(self.offset);
    }

    /// Step the zoom through 1/n and n factors.
    pub fn zoom_step(&mut self, zoom_in: bool) {
        let zoom = if self.zoom >= 1.0 {
            let n = self.zoom.round().max(1.0);
            match (zoom_in, n > 1.0) {
                (true, _) => n + 1.0,
                (false, true) => n - 1.0,
                (false, false) => 0.5,
            }
        } else {
            let n = (1.0 / self.zoom).round().max(2.0);
            if zoom_in {
                if n > 2.0 {
                    1.0 / (n - 1.0)
                } else {
                    1.0
                }
            } else {
                1.0 / (n + 1.0)
            }
        };
        self.set_zoom(zoom);
    }

    /// Pan to `offset` frame pixels from the frame centre, clamped so the
    /// zoomed frame still covers the viewport.
    pub fn set_offset(&mut self, offset: Vec2) {
        let limit = self.offset_limit();
        let offset = offset.clamp(-limit, limit);
        if offset == self.offset {
            return;
        }
        self.offset = offset;
        emit(&self.events, MonitorEvent::OffsetChanged(offset));
    }

    /// Horizontal scrollbar moved to `value` out of `max`.
    pub fn set_offset_x(&mut self, value: i32, max: i32) {
        let x = scrollbar_to_offset(value, max, self.offset_limit().x);
        self.set_offset(Vec2::new(x, self.offset.y));
    }

    /// Vertical scrollbar moved to `value` out of `max`.
    pub fn set_offset_y(&mut self, value: i32, max: i32) {
        let y = scrollbar_to_offset(value, max, self.offset_limit().y);
        self.set_offset(Vec2::new(self.offset.x, y));
    }

    /// Ctrl+wheel zooms; a plain wheel asks the owner to scrub.
    pub fn wheel(&mut self, delta: i32, modifiers: Modifiers) {
        if delta == 0 {
            return;
        }
        if modifiers.ctrl {
            self.zoom_step(delta > 0);
        } else {
            emit(&self.events, MonitorEvent::MouseSeek { delta, modifiers });
        }
    }

    pub fn begin_drag(&mut self, cursor: Vec2) {
        self.drag = Some(DragAnchor {
            cursor,
            offset: self.offset,
        });
    }

    /// Pan with the cursor, given in surface pixels.
    pub fn drag_to(&mut self, cursor: Vec2) {
        let Some(anchor) = self.drag else {
            return;
        };
        let scale = self.surface_pixels_per_frame_pixel();
        if scale <= 0.0 {
            return;
        }
        self.set_offset(anchor.offset - (cursor - anchor.cursor) / scale);
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Rectangle, in frame pixels, shown normally while the rest is dimmed.
    pub fn set_effect_rect(&mut self, rect: Option<Rect>) {
        self.effect_rect = rect.and_then(|r| r.intersection(self.frame_rect()));
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    /// Letterboxed frame area inside the widget.
    pub fn display_rect(&self) -> Rect {
        self.display_rect
    }

    pub fn effect_rect(&self) -> Option<Rect> {
        self.effect_rect
    }

    pub fn profile_size(&self) -> (u32, u32) {
        (self.profile.width, self.profile.height)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Zoom and pan in viewport clip space. The quad spans `[-1, 1]`.
    pub fn view_transform(&self) -> Transform2D {
        let (width, height) = self.profile_size();
        if width == 0 || height == 0 {
            return Transform2D::scale_uniform(self.zoom);
        }
        let tx = -self.offset.x * 2.0 * self.zoom / width as f32;
        // frame y grows downwards, clip y upwards
        let ty = self.offset.y * 2.0 * self.zoom / height as f32;
        Transform2D::translate(tx, ty).then(Transform2D::scale_uniform(self.zoom))
    }

    fn frame_rect(&self) -> Rect {
        let (width, height) = self.profile_size();
        Rect::from_size(width as f32, height as f32)
    }

    fn offset_limit(&self) -> Vec2 {
        if self.zoom <= 1.0 {
            return Vec2::ZERO;
        }
        let (width, height) = self.profile_size();
        Vec2::new(width as f32, height as f32) * 0.5 * (1.0 - 1.0 / self.zoom)
    }

    fn surface_pixels_per_frame_pixel(&self) -> f32 {
        let (width, _) = self.profile_size();
        if width == 0 {
            return 0.0;
        }
        self.display_rect.width / width as f32 * self.zoom
    }

    fn update_display_rect(&mut self) {
        let (width, height) = self.surface_size;
        let rect = Rect::from_size(width as f32, height as f32)
            .fit_aspect(self.profile.display_aspect_ratio());
        if rect != self.display_rect {
            self.display_rect = rect;
            debug!(?rect, "Display rect changed");
            emit(&self.events, MonitorEvent::RectChanged(rect));
        }
    }
}

fn scrollbar_to_offset(value: i32, max: i32, limit: f32) -> f32 {
    if max <= 0 {
        return 0.0;
    }
    let t = value.clamp(0, max) as f32 / max as f32;
    (t * 2.0 - 1.0) * limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use cutscope_core::{FrameBuffer, FrameRate, RationalTime};
    use cutscope_gpu::{CpuBackend, FrameLayout, RecordingPresenter, TextureSet};
    use std::time::Duration;

    struct Rig {
        display: DisplaySurface,
        gate: Arc<SlotGate>,
        presenter: RecordingPresenter,
        backend: CpuBackend,
        events: events::EventReceiver,
    }

    fn rig() -> Rig {
        let gate = Arc::new(SlotGate::new(vec![TextureSet::new(), TextureSet::new(), TextureSet::new()]));
        let presenter = RecordingPresenter::new();
        let (tx, rx) = events::channel();
        let mut display = DisplaySurface::new(
            gate.clone(),
            Box::new(presenter.clone()),
            Arc::new(FrameStats::new()),
            tx,
            Profile::hd1080p25(),
            (0.125, 8.0),
        );
        display.resize(1600, 1000);
        Rig {
            display,
            gate,
            presenter,
            backend: CpuBackend::new(),
            events: rx,
        }
    }

    fn publish(rig: &Rig, position: i64) {
        let buffer = FrameBuffer::solid_yuv(64, 36, 16, 128, 128);
        let layout = FrameLayout::for_buffer(&buffer).unwrap();
        let seq = rig.gate.ticket();
        let mut writer = rig
            .gate
            .acquire_slot(rig.gate.epoch(), Duration::from_millis(100))
            .unwrap();
        writer.ensure(&rig.backend, &layout).unwrap();
        writer.upload(&rig.backend, &buffer).unwrap();
        assert!(writer.publish(FrameStamp {
            seq,
            position,
            pts: RationalTime::from_frames(position, FrameRate::FPS_25),
        }));
    }

    #[test]
    fn test_letterbox_rect() {
        let rig = rig();
        let rect = rig.display.display_rect();
        assert_eq!(rect.width, 1600.0);
        assert_eq!(rect.height, 900.0);
        assert_eq!(rect.y, 50.0);
    }

    #[test]
    fn test_paint_without_frame_is_blank() {
        let mut rig = rig();
        let outcome = rig.display.paint().unwrap();
        assert_eq!(outcome, PaintOutcome::default());
        assert_eq!(rig.presenter.last().unwrap().frame, None);
    }

    #[test]
    fn test_paint_repeats_previous_frame() {
        let mut rig = rig();
        publish(&rig, 7);
        let first = rig.display.paint().unwrap();
        assert_eq!(first.new_frame.map(|s| s.position), Some(7));
        let second = rig.display.paint().unwrap();
        assert_eq!(second.new_frame, None);
        assert_eq!(rig.presenter.count(), 2);
        assert_eq!(rig.presenter.last().unwrap().position(), Some(7));
    }

    #[test]
    fn test_skipped_frames_are_counted() {
        let mut rig = rig();
        publish(&rig, 1);
        publish(&rig, 2);
        publish(&rig, 3);
        let outcome = rig.display.paint().unwrap();
        assert_eq!(outcome.skipped, 2);
        assert_eq!(rig.display.stats.dropped(), 2);
        let events: Vec<_> = rig.events.try_iter().collect();
        assert!(events.contains(&MonitorEvent::DroppedFramesChanged(2)));
    }

    #[test]
    fn test_zoom_clamps_and_offset_follows() {
        let mut rig = rig();
        rig.display.set_zoom(2.0);
        rig.display.set_offset(Vec2::new(10_000.0, -10_000.0));
        assert_eq!(rig.display.offset(), Vec2::new(480.0, -270.0));
        rig.display.set_zoom(1.0);
        assert_eq!(rig.display.offset(), Vec2::ZERO);
        rig.display.set_zoom(100.0);
        assert_eq!(rig.display.zoom(), 8.0);
    }

    #[test]
    fn test_zoom_steps() {
        let mut rig = rig();
        rig.display.zoom_step(true);
        assert_eq!(rig.display.zoom(), 2.0);
        rig.display.zoom_step(false);
        rig.display.zoom_step(false);
        assert_eq!(rig.display.zoom(), 0.5);
        rig.display.zoom_step(false);
        assert!((rig.display.zoom() - 1.0 / 3.0).abs() < 1e-6);
        rig.display.zoom_step(true);
        rig.display.zoom_step(true);
        assert_eq!(rig.display.zoom(), 1.0);
    }

    #[test]
    fn test_scrollbar_offsets() {
        let mut rig = rig();
        rig.display.set_zoom(2.0);
        rig.display.set_offset_x(0, 100);
        assert_eq!(rig.display.offset().x, -480.0);
        rig.display.set_offset_y(100, 100);
        assert_eq!(rig.display.offset().y, 270.0);
        rig.display.set_offset_x(50, 100);
        assert_eq!(rig.display.offset().x, 0.0);
    }

    #[test]
    fn test_wheel_without_ctrl_requests_seek() {
        let mut rig = rig();
        rig.display.wheel(-120, Modifiers::NONE);
        rig.display.wheel(120, Modifiers::CTRL);
        let events: Vec<_> = rig.events.try_iter().collect();
        assert!(events.contains(&MonitorEvent::MouseSeek {
            delta: -120,
            modifiers: Modifiers::NONE
        }));
        assert_eq!(rig.display.zoom(), 2.0);
    }

    #[test]
    fn test_drag_pans_view() {
        let mut rig = rig();
        rig.display.set_zoom(2.0);
        rig.display.begin_drag(Vec2::new(500.0, 500.0));
        // 1600 px wide rect over 1920 frame px at zoom 2
        rig.display.drag_to(Vec2::new(450.0, 500.0));
        rig.display.end_drag();
        assert!((rig.display.offset().x - 30.0).abs() < 1e-3);
        rig.display.drag_to(Vec2::new(0.0, 0.0));
        assert!((rig.display.offset().x - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_transform_maps_offset_to_centre() {
        let mut rig = rig();
        rig.display.set_zoom(2.0);
        rig.display.set_offset(Vec2::new(480.0, 0.0));
        // frame pixel 1440 (x = 0.5 in clip space) lands on the viewport centre
        let centre = rig.display.view_transform().transform_point(Vec2::new(0.5, 0.0));
        assert!(centre.x.abs() < 1e-5);
    }

    #[test]
    fn test_effect_rect_is_normalized() {
        let mut rig = rig();
        rig.display.set_effect_rect(Some(Rect::new(0.0, 0.0, 960.0, 1080.0)));
        let command = rig.display.compose();
        assert_eq!(command.effect_rect, Some(Rect::new(0.0, 0.0, 0.5, 1.0)));
    }
}
