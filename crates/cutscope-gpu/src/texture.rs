//! wgpu textures for frame planes and the monitor's render target.

use crate::backend::TextureDesc;
use cutscope_core::{CutScopeError, Result};

/// Output format of the monitor's render target.
pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const PLANE_USAGE: wgpu::TextureUsages =
    wgpu::TextureUsages::TEXTURE_BINDING.union(wgpu::TextureUsages::COPY_DST);
const TARGET_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC);

/// One video plane, or the target the monitor composes into.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl GpuTexture {
    fn create(
        device: &wgpu::Device,
        (width, height): (u32, u32),
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
            format,
        }
    }

    /// Sampled texture for the plane described by `desc`.
    pub fn for_plane(device: &wgpu::Device, desc: &TextureDesc) -> Self {
        Self::create(
            device,
            (desc.width, desc.height),
            desc.format.to_wgpu(),
            PLANE_USAGE,
            "cutscope-plane",
        )
    }

    pub fn render_target(device: &wgpu::Device, width: u32, height: u32) -> Self {
        Self::create(
            device,
            (width.max(1), height.max(1)),
            TARGET_FORMAT,
            TARGET_USAGE,
            "cutscope-target",
        )
    }

    /// Write `height` rows spaced `stride` bytes apart.
    pub fn upload(&self, queue: &wgpu::Queue, data: &[u8], stride: usize) -> Result<()> {
        let row_bytes = self.width as usize * self.bytes_per_pixel();
        let needed = stride * (self.height as usize).saturating_sub(1) + row_bytes;
        if stride < row_bytes || data.len() < needed {
            return Err(CutScopeError::InvalidParameter(format!(
                "upload of {} bytes (stride {stride}) does not cover {}x{} plane",
                data.len(),
                self.width,
                self.height
            )));
        }

        let destination = wgpu::ImageCopyTexture {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        };
        let layout = wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(stride as u32),
            rows_per_image: Some(self.height),
        };
        queue.write_texture(destination, data, layout, extent(self.width, self.height));
        Ok(())
    }

    fn bytes_per_pixel(&self) -> usize {
        self.format.block_copy_size(None).unwrap_or(4) as usize
    }

    pub fn memory_size(&self) -> usize {
        (self.width * self.height) as usize * self.bytes_per_pixel()
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}
