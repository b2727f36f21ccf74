//! Texture backend abstraction.
//!
//! Textures are addressed by opaque [`TextureId`]s, the way GL texture names
//! are. A backend must be usable from the renderer thread (upload) and the
//! UI thread (presentation) at the same time; ownership of any single texture
//! is coordinated by the monitor's frame gate, not by the backend.

use cutscope_core::{memory_budget, Result};
use smallvec::SmallVec;

/// Opaque handle to a texture owned by a [`TextureBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Texel layout of a single plane texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneFormat {
    /// One 8-bit channel (Y, U or V)
    R8,
    /// Two interleaved 8-bit channels (NV12 UV)
    Rg8,
    /// Packed 8-bit RGBA
    Rgba8,
}

impl PlaneFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rg8 => 2,
            Self::Rgba8 => 4,
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R8 => wgpu::TextureFormat::R8Unorm,
            Self::Rg8 => wgpu::TextureFormat::Rg8Unorm,
            Self::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// Size and format of one plane texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PlaneFormat,
}

impl TextureDesc {
    pub fn memory_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// What a backend can do, probed once on a render worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub backend_name: String,
    pub max_texture_dimension: u32,
    pub formats: SmallVec<[PlaneFormat; 3]>,
}

impl Capabilities {
    pub fn supports(&self, format: PlaneFormat) -> bool {
        self.formats.contains(&format)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            backend_name: "unknown".into(),
            max_texture_dimension: memory_budget::DEFAULT_MAX_TEXTURE_DIMENSION,
            formats: smallvec::smallvec![PlaneFormat::R8, PlaneFormat::Rg8, PlaneFormat::Rgba8],
        }
    }
}

/// Storage for plane textures.
pub trait TextureBackend: Send + Sync {
    /// Query limits and supported formats.
    fn capabilities(&self) -> Capabilities;

    /// Allocate a texture. Fails with `OutOfMemory` when the budget is spent.
    fn allocate(&self, desc: TextureDesc) -> Result<TextureId>;

    /// Replace the texture contents with `desc.height` rows of
    /// `desc.width * bytes_per_pixel` bytes, spaced `stride` bytes apart in `data`.
    fn upload(&self, id: TextureId, data: &[u8], stride: usize) -> Result<()>;

    /// Free a texture. Unknown ids are ignored.
    fn release(&self, id: TextureId);

    /// Bytes currently allocated.
    fn memory_used(&self) -> usize;
}
