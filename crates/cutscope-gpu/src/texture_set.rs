//! Per-slot plane textures.
//!
//! Each buffer slot of the monitor owns one [`TextureSet`]: up to three plane
//! textures matching the layout of the last frame uploaded into it. The set is
//! reallocated only when the incoming frame's layout differs.

use crate::backend::{Capabilities, PlaneFormat, TextureBackend, TextureDesc, TextureId};
use cutscope_core::{CutScopeError, FrameBuffer, PixelFormat, Result};
use smallvec::SmallVec;
use tracing::debug;

/// How the planes of a frame combine into colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneLayout {
    /// One RGBA texture
    Packed,
    /// Y texture plus interleaved UV texture (NV12)
    SemiPlanar,
    /// Separate Y, U and V textures
    Planar,
}

impl PlaneLayout {
    /// Shader mode selector.
    pub fn shader_mode(self) -> u32 {
        match self {
            Self::Packed => 0,
            Self::SemiPlanar => 1,
            Self::Planar => 2,
        }
    }
}

/// Texture geometry needed to display one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub layout: PlaneLayout,
    pub planes: SmallVec<[TextureDesc; 3]>,
}

impl FrameLayout {
    /// Derive the texture layout for a frame buffer, or reject its format.
    pub fn for_buffer(buffer: &FrameBuffer) -> Result<Self> {
        let (layout, formats): (PlaneLayout, &[PlaneFormat]) = match buffer.format {
            PixelFormat::Rgba8 => (PlaneLayout::Packed, &[PlaneFormat::Rgba8][..]),
            PixelFormat::Nv12 => (PlaneLayout::SemiPlanar, &[PlaneFormat::R8, PlaneFormat::Rg8][..]),
            PixelFormat::Yuv420P => (
                PlaneLayout::Planar,
                &[PlaneFormat::R8, PlaneFormat::R8, PlaneFormat::R8][..],
            ),
            other => {
                return Err(CutScopeError::UnsupportedFormat(format!(
                    "{other:?} frames cannot be displayed"
                )))
            }
        };
        let planes = buffer
            .planes
            .iter()
            .zip(formats)
            .map(|(plane, &format)| TextureDesc {
                width: plane.width,
                height: plane.height,
                format,
            })
            .collect();
        Ok(Self {
            width: buffer.width,
            height: buffer.height,
            layout,
            planes,
        })
    }

    /// Check the layout against what the backend reported.
    pub fn check(&self, caps: &Capabilities) -> Result<()> {
        if self.width > caps.max_texture_dimension || self.height > caps.max_texture_dimension {
            return Err(CutScopeError::UnsupportedFormat(format!(
                "{}x{} exceeds the {} texture limit of {}",
                self.width, self.height, caps.backend_name, caps.max_texture_dimension
            )));
        }
        if let Some(missing) = self.planes.iter().find(|p| !caps.supports(p.format)) {
            return Err(CutScopeError::UnsupportedFormat(format!(
                "{} backend has no {:?} textures",
                caps.backend_name, missing.format
            )));
        }
        Ok(())
    }

    pub fn memory_size(&self) -> usize {
        self.planes.iter().map(TextureDesc::memory_size).sum()
    }
}

/// Plane textures owned by one buffer slot.
#[derive(Debug, Default)]
pub struct TextureSet {
    layout: Option<FrameLayout>,
    ids: SmallVec<[TextureId; 3]>,
    allocations: u64,
}

impl TextureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure the textures match `layout`, reallocating if needed.
    ///
    /// Returns `true` when a reallocation happened. On failure the set is
    /// left empty.
    pub fn ensure(&mut self, backend: &dyn TextureBackend, layout: &FrameLayout) -> Result<bool> {
        if self.layout.as_ref() == Some(layout) {
            return Ok(false);
        }
        self.release(backend);
        let mut ids = SmallVec::new();
        for desc in &layout.planes {
            match backend.allocate(*desc) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        backend.release(id);
                    }
                    return Err(e);
                }
            }
        }
        debug!(
            width = layout.width,
            height = layout.height,
            planes = ids.len(),
            "texture set reallocated"
        );
        self.ids = ids;
        self.layout = Some(layout.clone());
        self.allocations += 1;
        Ok(true)
    }

    /// Upload every plane of `buffer`. The set must already match its layout.
    pub fn upload(&self, backend: &dyn TextureBackend, buffer: &FrameBuffer) -> Result<()> {
        if self.ids.len() != buffer.planes.len() {
            return Err(CutScopeError::Internal(format!(
                "texture set holds {} planes, frame has {}",
                self.ids.len(),
                buffer.planes.len()
            )));
        }
        for (&id, plane) in self.ids.iter().zip(&buffer.planes) {
            backend.upload(id, &plane.data, plane.stride)?;
        }
        Ok(())
    }

    /// Free all textures.
    pub fn release(&mut self, backend: &dyn TextureBackend) {
        for id in self.ids.drain(..) {
            backend.release(id);
        }
        self.layout = None;
    }

    pub fn ids(&self) -> &[TextureId] {
        &self.ids
    }

    pub fn layout(&self) -> Option<&FrameLayout> {
        self.layout.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// How many times this set has been (re)allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}
