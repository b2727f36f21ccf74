//! Texture backend on a wgpu device.

use crate::backend::{Capabilities, TextureBackend, TextureDesc, TextureId};
use crate::context::GpuContext;
use crate::texture::GpuTexture;
use cutscope_core::{memory_budget, CutScopeError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
struct Textures {
    live: HashMap<TextureId, GpuTexture>,
    next_id: u64,
    used: usize,
}

/// Plane textures living on the GPU.
pub struct WgpuBackend {
    context: Arc<GpuContext>,
    textures: Mutex<Textures>,
    budget: usize,
}

impl WgpuBackend {
    pub fn new(context: Arc<GpuContext>) -> Self {
        Self::with_budget(context, memory_budget::GPU_TEXTURE_BUDGET)
    }

    pub fn with_budget(context: Arc<GpuContext>, budget: usize) -> Self {
        Self {
            context,
            textures: Mutex::new(Textures::default()),
            budget,
        }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.context
    }

    /// Run `f` with the views of `ids`, in order. Returns `None` if any id is
    /// unknown.
    pub fn with_views<R>(
        &self,
        ids: &[TextureId],
        f: impl FnOnce(&[&wgpu::TextureView]) -> R,
    ) -> Option<R> {
        let textures = self.textures.lock();
        let views: Option<Vec<&wgpu::TextureView>> = ids
            .iter()
            .map(|id| textures.live.get(id).map(|t| &t.view))
            .collect();
        views.map(|views| f(&views))
    }
}

impl TextureBackend for WgpuBackend {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            backend_name: format!("wgpu/{:?}", self.context.adapter_info().backend),
            max_texture_dimension: self.context.max_texture_dimension(),
            ..Capabilities::default()
        }
    }

    fn allocate(&self, desc: TextureDesc) -> Result<TextureId> {
        let size = desc.memory_size();
        {
            let textures = self.textures.lock();
            if textures.used + size > self.budget {
                return Err(CutScopeError::OutOfMemory(format!(
                    "texture budget of {} bytes spent ({} in use)",
                    self.budget, textures.used
                )));
            }
        }

        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = GpuTexture::for_plane(device, &desc);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            warn!(?desc, "GPU texture allocation failed: {err}");
            return Err(CutScopeError::OutOfMemory(err.to_string()));
        }

        let mut textures = self.textures.lock();
        let id = TextureId(textures.next_id);
        textures.next_id += 1;
        textures.used += size;
        textures.live.insert(id, texture);
        debug!(?id, ?desc, "gpu texture allocated");
        Ok(id)
    }

    fn upload(&self, id: TextureId, data: &[u8], stride: usize) -> Result<()> {
        let textures = self.textures.lock();
        let texture = textures
            .live
            .get(&id)
            .ok_or_else(|| CutScopeError::Gpu(format!("upload to unknown texture {id:?}")))?;
        texture.upload(&self.context.queue, data, stride)
    }

    fn release(&self, id: TextureId) {
        let mut textures = self.textures.lock();
        if let Some(texture) = textures.live.remove(&id) {
            textures.used -= texture.memory_size();
            texture.texture.destroy();
        }
    }

    fn memory_used(&self) -> usize {
        self.textures.lock().used
    }
}
