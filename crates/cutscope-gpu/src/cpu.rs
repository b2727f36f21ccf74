//! RAM-backed texture backend.
//!
//! Behaves like a GPU with a fixed texture budget: allocations past the
//! budget fail with `OutOfMemory`. Used for headless monitors and tests, and
//! supports injecting upload failures.

use crate::backend::{Capabilities, PlaneFormat, TextureBackend, TextureDesc, TextureId};
use cutscope_core::{memory_budget, CutScopeError, Result};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

struct CpuTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

#[derive(Default)]
struct CpuStore {
    textures: HashMap<TextureId, CpuTexture>,
    next_id: u64,
    used: usize,
    uploads: u64,
}

/// Texture backend that keeps every texture in a `Vec<u8>`.
pub struct CpuBackend {
    store: Mutex<CpuStore>,
    budget: usize,
    capabilities: Capabilities,
    failing_uploads: AtomicU32,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_budget(memory_budget::GPU_TEXTURE_BUDGET)
    }

    /// Backend that refuses allocations once `budget` bytes are live.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            store: Mutex::new(CpuStore::default()),
            budget,
            capabilities: Capabilities {
                backend_name: "cpu".into(),
                ..Capabilities::default()
            },
            failing_uploads: AtomicU32::new(0),
        }
    }

    /// Restrict the plane formats this backend claims to support.
    pub fn with_formats(mut self, formats: &[PlaneFormat]) -> Self {
        self.capabilities.formats = SmallVec::from_slice(formats);
        self
    }

    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.capabilities.max_texture_dimension = max;
        self
    }

    /// Make the next `count` uploads fail.
    pub fn fail_next_uploads(&self, count: u32) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    /// Copy of a texture's packed contents.
    pub fn texture_data(&self, id: TextureId) -> Option<Vec<u8>> {
        self.store.lock().textures.get(&id).map(|t| t.data.clone())
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<TextureDesc> {
        self.store.lock().textures.get(&id).map(|t| t.desc)
    }

    /// Number of textures currently allocated.
    pub fn live_textures(&self) -> usize {
        self.store.lock().textures.len()
    }

    /// Total successful uploads since creation.
    pub fn upload_count(&self) -> u64 {
        self.store.lock().uploads
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureBackend for CpuBackend {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn allocate(&self, desc: TextureDesc) -> Result<TextureId> {
        let size = desc.memory_size();
        let mut store = self.store.lock();
        if store.used + size > self.budget {
            return Err(CutScopeError::OutOfMemory(format!(
                "{}x{} {:?} needs {size} bytes, {} of {} in use",
                desc.width, desc.height, desc.format, store.used, self.budget
            )));
        }
        let id = TextureId(store.next_id);
        store.next_id += 1;
        store.used += size;
        store.textures.insert(
            id,
            CpuTexture {
                desc,
                data: vec![0u8; size],
            },
        );
        debug!(?id, ?desc, "cpu texture allocated");
        Ok(id)
    }

    fn upload(&self, id: TextureId, data: &[u8], stride: usize) -> Result<()> {
        let injected = self
            .failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CutScopeError::Gpu(format!("injected upload failure on {id:?}")));
        }

        let mut store = self.store.lock();
        let texture = store
            .textures
            .get_mut(&id)
            .ok_or_else(|| CutScopeError::Gpu(format!("upload to unknown texture {id:?}")))?;
        let row_bytes = texture.desc.width as usize * texture.desc.format.bytes_per_pixel();
        let rows = texture.desc.height as usize;
        let needed = if rows == 0 { 0 } else { stride * (rows - 1) + row_bytes };
        if stride < row_bytes || data.len() < needed {
            return Err(CutScopeError::InvalidParameter(format!(
                "upload of {} bytes (stride {stride}) does not cover {}x{} texture",
                data.len(),
                texture.desc.width,
                texture.desc.height
            )));
        }
        for (row, dst) in texture.data.chunks_exact_mut(row_bytes.max(1)).enumerate() {
            let start = row * stride;
            dst.copy_from_slice(&data[start..start + row_bytes]);
        }
        store.uploads += 1;
        Ok(())
    }

    fn release(&self, id: TextureId) {
        let mut store = self.store.lock();
        if let Some(texture) = store.textures.remove(&id) {
            store.used -= texture.desc.memory_size();
        }
    }

    fn memory_used(&self) -> usize {
        self.store.lock().used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(width: u32, height: u32, format: PlaneFormat) -> TextureDesc {
        TextureDesc {
            width,
            height,
            format,
        }
    }

    #[test]
    fn test_allocate_and_release_track_memory() {
        let backend = CpuBackend::new();
        let id = backend.allocate(desc(4, 4, PlaneFormat::Rgba8)).unwrap();
        assert_eq!(backend.memory_used(), 64);
        backend.release(id);
        assert_eq!(backend.memory_used(), 0);
        backend.release(id); // unknown ids are ignored
    }

    #[test]
    fn test_budget_exhaustion_is_out_of_memory() {
        let backend = CpuBackend::with_budget(100);
        backend.allocate(desc(8, 8, PlaneFormat::R8)).unwrap();
        let err = backend.allocate(desc(8, 8, PlaneFormat::R8)).unwrap_err();
        assert!(err.is_out_of_memory());
    }

    #[test]
    fn test_upload_strips_row_padding() {
        let backend = CpuBackend::new();
        let id = backend.allocate(desc(2, 2, PlaneFormat::R8)).unwrap();
        backend.upload(id, &[1, 2, 99, 99, 3, 4], 4).unwrap();
        assert_eq!(backend.texture_data(id).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(backend.upload_count(), 1);
    }

    #[test]
    fn test_upload_rejects_short_data() {
        let backend = CpuBackend::new();
        let id = backend.allocate(desc(2, 2, PlaneFormat::Rg8)).unwrap();
        assert!(backend.upload(id, &[0; 6], 4).is_err());
    }

    #[test]
    fn test_injected_failures_are_consumed() {
        let backend = CpuBackend::new();
        let id = backend.allocate(desc(1, 1, PlaneFormat::R8)).unwrap();
        backend.fail_next_uploads(1);
        assert!(backend.upload(id, &[7], 1).is_err());
        assert!(backend.upload(id, &[7], 1).is_ok());
    }
}
