//! Headless wgpu device for the monitor.
//!
//! The monitor never owns a window surface: textures are uploaded from the
//! renderer thread and composed into an offscreen target, so any adapter
//! that can sample 2D textures will do. When no hardware adapter is found
//! the software fallback is tried before giving up.

use cutscope_core::{memory_budget, CutScopeError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// How to pick an adapter.
#[derive(Debug, Clone, Copy)]
pub struct ContextOptions {
    pub power_preference: wgpu::PowerPreference,
    /// Accept a software adapter when no hardware one is available.
    pub allow_software: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            allow_software: true,
        }
    }
}

/// Device and queue shared by the texture backend and the presenter.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    pub async fn with_options(options: ContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY | wgpu::Backends::GL,
            ..Default::default()
        });

        let adapter = match request_adapter(&instance, options.power_preference, false).await {
            Some(adapter) => adapter,
            None if options.allow_software => {
                warn!("No hardware adapter, trying the software fallback");
                request_adapter(&instance, options.power_preference, true)
                    .await
                    .ok_or_else(|| CutScopeError::Gpu("no usable adapter".into()))?
            }
            None => return Err(CutScopeError::Gpu("no hardware adapter".into())),
        };

        let info = adapter.get_info();
        let max_dimension = adapter
            .limits()
            .max_texture_dimension_2d
            .min(memory_budget::DEFAULT_MAX_TEXTURE_DIMENSION);
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("cutscope-monitor"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: max_dimension,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| CutScopeError::Gpu(format!("device request on {} failed: {e}", info.name)))?;
        info!(adapter = %info.name, backend = ?info.backend, max_dimension, "GPU device ready");

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// Default options, blocking on the async adapter and device requests.
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::with_options(ContextOptions::default()))
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

async fn request_adapter(
    instance: &wgpu::Instance,
    power_preference: wgpu::PowerPreference,
    force_fallback_adapter: bool,
) -> Option<wgpu::Adapter> {
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter,
        })
        .await
}
