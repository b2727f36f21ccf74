//! CutScope Core - Foundation types for the monitor pipeline
//!
//! This crate provides the fundamental types shared by the GPU layer and the
//! monitor:
//! - Produced frames and their pixel planes (Frame, FrameBuffer, PixelFormat)
//! - Time representation (RationalTime, FrameRate, Zone)
//! - Project profile (frame geometry, rate, pixel aspect, colour matrix)
//! - Geometric primitives for letterboxing and view transforms

pub mod error;
pub mod frame;
pub mod geometry;
pub mod profile;
pub mod time;

pub use error::{CutScopeError, Result};
pub use frame::{Frame, FrameBuffer, FramePlane, PixelFormat, SharedFrameBuffer};
pub use geometry::{Rect, Transform2D, Vec2};
pub use profile::{ColorMatrix, Profile};
pub use time::{FrameRate, RationalTime, Zone};

/// Memory budget constants for the monitor's GPU textures.
pub mod memory_budget {
    /// Maximum texture memory a monitor may hold on the GPU.
    pub const GPU_TEXTURE_BUDGET: usize = 512 * 1024 * 1024; // 512 MB

    /// Largest texture edge accepted when the backend reports nothing better.
    pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 8192;

    /// Upper bound on buffered frames between renderer and display.
    pub const MAX_BUFFERED_FRAMES: usize = 3;
}
