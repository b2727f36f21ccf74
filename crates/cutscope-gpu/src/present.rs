//! Presentation of composed monitor frames.
//!
//! The display surface builds one [`DrawCommand`] per paint and hands it to a
//! [`Presenter`]. [`WgpuPresenter`] renders it into an offscreen target;
//! [`RecordingPresenter`] only keeps the commands, for headless runs and tests.

use crate::backend::TextureId;
use crate::pipeline::{MonitorPipeline, MonitorUniforms};
use crate::texture::GpuTexture;
use crate::texture_set::PlaneLayout;
use crate::wgpu_backend::WgpuBackend;
use cutscope_core::{ColorMatrix, CutScopeError, Rect, Result, Transform2D};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::trace;

/// The frame textures to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDraw {
    pub position: i64,
    pub layout: PlaneLayout,
    pub textures: SmallVec<[TextureId; 3]>,
}

/// Everything needed to paint the monitor once.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    /// Size of the whole widget surface in pixels.
    pub surface_size: (u32, u32),
    /// Letterboxed area the frame is drawn into, in surface pixels.
    pub viewport: Rect,
    /// Zoom and pan, applied to the quad in viewport clip space.
    pub transform: Transform2D,
    /// `None` paints the background only.
    pub frame: Option<FrameDraw>,
    /// Effect compare rectangle in normalized frame coordinates.
    pub effect_rect: Option<Rect>,
    pub color_matrix: ColorMatrix,
}

impl DrawCommand {
    /// A background-only paint.
    pub fn blank(surface_size: (u32, u32), viewport: Rect) -> Self {
        Self {
            surface_size,
            viewport,
            transform: Transform2D::IDENTITY,
            frame: None,
            effect_rect: None,
            color_matrix: ColorMatrix::default(),
        }
    }

    pub fn position(&self) -> Option<i64> {
        self.frame.as_ref().map(|f| f.position)
    }
}

/// Draws composed monitor frames.
pub trait Presenter: Send {
    fn present(&mut self, command: &DrawCommand) -> Result<()>;
}

/// Presenter that records every command it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresenter {
    commands: Arc<Mutex<Vec<DrawCommand>>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<DrawCommand> {
        self.commands.lock().clone()
    }

    pub fn last(&self) -> Option<DrawCommand> {
        self.commands.lock().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, command: &DrawCommand) -> Result<()> {
        self.commands.lock().push(command.clone());
        Ok(())
    }
}

/// Presenter rendering into an offscreen wgpu target.
pub struct WgpuPresenter {
    backend: Arc<WgpuBackend>,
    pipeline: MonitorPipeline,
    target: Option<GpuTexture>,
}

impl WgpuPresenter {
    pub fn new(backend: Arc<WgpuBackend>) -> Self {
        let pipeline = MonitorPipeline::new(&backend.context().device);
        Self {
            backend,
            pipeline,
            target: None,
        }
    }

    /// Current render target, if anything has been presented yet.
    pub fn target(&self) -> Option<&GpuTexture> {
        self.target.as_ref()
    }

    fn ensure_target(&mut self, (width, height): (u32, u32)) {
        let stale = self
            .target
            .as_ref()
            .map_or(true, |t| t.width != width.max(1) || t.height != height.max(1));
        if stale {
            let device = &self.backend.context().device;
            self.target = Some(GpuTexture::render_target(device, width, height));
        }
    }
}

impl Presenter for WgpuPresenter {
    fn present(&mut self, command: &DrawCommand) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        let context = Arc::clone(backend.context());
        self.ensure_target(command.surface_size);
        let target = self
            .target
            .as_ref()
            .ok_or_else(|| CutScopeError::Internal("render target missing".into()))?;

        let uniforms = MonitorUniforms::from_command(command);
        context
            .queue
            .write_buffer(&self.pipeline.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = match &command.frame {
            Some(frame) => {
                let group = backend.with_views(&frame.textures, |views| {
                    let first = views.first().copied()?;
                    let second = views.get(1).copied().unwrap_or(first);
                    let third = views.get(2).copied().unwrap_or(second);
                    Some(
                        self.pipeline
                            .bind_group(&context.device, [first, second, third]),
                    )
                });
                Some(group.flatten().ok_or_else(|| {
                    CutScopeError::Gpu(format!(
                        "frame {} refers to released textures",
                        frame.position
                    ))
                })?)
            }
            None => None,
        };

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("monitor-present"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("monitor-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some(bind_group) = &bind_group {
                let vp = command.viewport;
                if !vp.is_empty() {
                    pass.set_viewport(vp.x, vp.y, vp.width, vp.height, 0.0, 1.0);
                    pass.set_pipeline(&self.pipeline.pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.draw(0..4, 0..1);
                }
            }
        }
        context.queue.submit(Some(encoder.finish()));
        trace!(position = ?command.position(), "monitor frame presented");
        Ok(())
    }
}
