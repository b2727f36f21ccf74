//! CutScope GPU - texture upload and frame presentation
//!
//! The monitor talks to textures only through [`TextureBackend`], so the same
//! pipeline runs on wgpu ([`WgpuBackend`]) or entirely in RAM ([`CpuBackend`])
//! for headless runs and tests.

pub mod backend;
pub mod context;
pub mod cpu;
pub mod pipeline;
pub mod present;
pub mod texture;
pub mod texture_set;
pub mod wgpu_backend;

pub use backend::{Capabilities, PlaneFormat, TextureBackend, TextureDesc, TextureId};
pub use context::{ContextOptions, GpuContext};
pub use cpu::CpuBackend;
pub use pipeline::{MonitorPipeline, MonitorUniforms};
pub use present::{DrawCommand, FrameDraw, Presenter, RecordingPresenter, WgpuPresenter};
pub use texture::GpuTexture;
pub use texture_set::{FrameLayout, PlaneLayout, TextureSet};
pub use wgpu_backend::WgpuBackend;
