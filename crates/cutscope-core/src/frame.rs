//! Produced frames and their pixel planes.
//!
//! A [`Frame`] is what the playback engine hands to the monitor: an immutable,
//! shared snapshot of decoded pixels tagged with its timeline position.

use crate::error::{CutScopeError, Result};
use crate::time::RationalTime;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::sync::Arc;

/// Pixel format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA (32 bits per pixel)
    #[default]
    Rgba8,
    /// 16-bit RGBA half-float (64 bits per pixel)
    Rgba16F,
    /// 8-bit grayscale
    Gray8,
    /// NV12: Y plane followed by interleaved UV at half resolution
    Nv12,
    /// YUV 4:2:0 planar
    Yuv420P,
    /// YUV 4:2:0 planar 10-bit (two bytes per sample)
    Yuv420P10,
}

impl PixelFormat {
    /// Number of planes for this format.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Rgba8 | Self::Rgba16F | Self::Gray8 => 1,
            Self::Nv12 => 2,
            Self::Yuv420P | Self::Yuv420P10 => 3,
        }
    }

    /// Whether the luma/chroma planes are stored separately.
    pub fn is_yuv(self) -> bool {
        matches!(self, Self::Nv12 | Self::Yuv420P | Self::Yuv420P10)
    }

    /// Plane geometry as `(width, height, bytes_per_pixel)` for a frame size.
    pub fn plane_geometry(self, width: u32, height: u32) -> SmallVec<[(u32, u32, usize); 3]> {
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        match self {
            Self::Rgba8 => smallvec::smallvec![(width, height, 4)],
            Self::Rgba16F => smallvec::smallvec![(width, height, 8)],
            Self::Gray8 => smallvec::smallvec![(width, height, 1)],
            Self::Nv12 => smallvec::smallvec![(width, height, 1), (cw, ch, 2)],
            Self::Yuv420P => smallvec::smallvec![(width, height, 1), (cw, ch, 1), (cw, ch, 1)],
            Self::Yuv420P10 => smallvec::smallvec![(width, height, 2), (cw, ch, 2), (cw, ch, 2)],
        }
    }
}

/// A plane of pixel data with stride information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlane {
    /// Raw pixel data, `stride * height` bytes
    pub data: Vec<u8>,
    /// Bytes per row (may include padding)
    pub stride: usize,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub bytes_per_pixel: usize,
}

impl FramePlane {
    /// Create a zeroed plane with a 64-byte aligned stride.
    pub fn new(width: u32, height: u32, bytes_per_pixel: usize) -> Self {
        let min_stride = (width as usize) * bytes_per_pixel;
        let stride = (min_stride + 63) & !63;
        Self {
            data: vec![0u8; stride * height as usize],
            stride,
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Bytes of visible pixels in one row (stride minus padding).
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel
    }

    /// Get a row of pixel data.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// Get a mutable row of pixel data.
    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let end = start + self.row_bytes();
        &mut self.data[start..end]
    }

    /// Fill every visible byte with `value`.
    pub fn fill(&mut self, value: u8) {
        for y in 0..self.height {
            self.row_mut(y).fill(value);
        }
    }

    /// Copy the visible pixels into a tightly packed buffer.
    pub fn packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.row_bytes() * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    fn is_consistent(&self) -> bool {
        self.stride >= self.row_bytes() && self.data.len() >= self.stride * self.height as usize
    }
}

/// Decoded pixels of one video frame in CPU memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Pixel format
    pub format: PixelFormat,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel data planes (1-3 depending on format)
    pub planes: SmallVec<[FramePlane; 3]>,
}

impl FrameBuffer {
    /// Create a zeroed frame buffer with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let planes = format
            .plane_geometry(width, height)
            .into_iter()
            .map(|(w, h, bpp)| FramePlane::new(w, h, bpp))
            .collect();
        Self {
            format,
            width,
            height,
            planes,
        }
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }

    /// Get the primary plane (plane 0).
    #[inline]
    pub fn primary_plane(&self) -> &FramePlane {
        &self.planes[0]
    }

    /// Get the primary plane mutably.
    #[inline]
    pub fn primary_plane_mut(&mut self) -> &mut FramePlane {
        &mut self.planes[0]
    }

    /// Check that the planes match what the format promises.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CutScopeError::InvalidParameter(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.format.plane_geometry(self.width, self.height);
        if expected.len() != self.planes.len() {
            return Err(CutScopeError::InvalidParameter(format!(
                "{:?} frame carries {} planes, expected {}",
                self.format,
                self.planes.len(),
                expected.len()
            )));
        }
        for (i, (plane, (w, h, bpp))) in self.planes.iter().zip(expected).enumerate() {
            if plane.width != w || plane.height != h || plane.bytes_per_pixel != bpp {
                return Err(CutScopeError::InvalidParameter(format!(
                    "plane {i} is {}x{}@{}, expected {w}x{h}@{bpp}",
                    plane.width, plane.height, plane.bytes_per_pixel
                )));
            }
            if !plane.is_consistent() {
                return Err(CutScopeError::InvalidParameter(format!(
                    "plane {i} data too short for stride {}",
                    plane.stride
                )));
            }
        }
        Ok(())
    }

    /// Expand a grayscale frame into RGBA8.
    pub fn gray_to_rgba8(&self) -> Result<Self> {
        if self.format != PixelFormat::Gray8 {
            return Err(CutScopeError::UnsupportedFormat(format!(
                "cannot expand {:?} as grayscale",
                self.format
            )));
        }
        let mut out = Self::new(self.width, self.height, PixelFormat::Rgba8);
        let src = self.primary_plane();
        let dst = out.primary_plane_mut();
        for y in 0..self.height {
            let src_row = src.row(y);
            let dst_row = dst.row_mut(y);
            for (x, &luma) in src_row.iter().enumerate() {
                dst_row[x * 4..x * 4 + 4].copy_from_slice(&[luma, luma, luma, 255]);
            }
        }
        Ok(out)
    }

    /// Create a test pattern frame (color bars).
    pub fn test_pattern(width: u32, height: u32) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];
        let mut frame = Self::new(width, height, PixelFormat::Rgba8);
        let plane = frame.primary_plane_mut();
        for y in 0..height {
            let row = plane.row_mut(y);
            for x in 0..width {
                let i = (x * 4) as usize;
                let bar = (x * 8 / width.max(1)) as usize;
                row[i..i + 4].copy_from_slice(&BARS[bar.min(7)]);
            }
        }
        frame
    }

    /// Create a flat YUV 4:2:0 frame.
    pub fn solid_yuv(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
        let mut frame = Self::new(width, height, PixelFormat::Yuv420P);
        for (plane, value) in frame.planes.iter_mut().zip([y, u, v]) {
            plane.fill(value);
        }
        frame
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;

/// One produced frame: pixels plus where it sits on the timeline.
///
/// Cloning is cheap; the pixels are shared until the last holder drops them.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame index on the producer's timeline.
    pub position: i64,
    /// Presentation timestamp.
    pub pts: RationalTime,
    /// Decoded pixels.
    pub buffer: SharedFrameBuffer,
}

impl Frame {
    pub fn new(position: i64, pts: RationalTime, buffer: FrameBuffer) -> Self {
        Self {
            position,
            pts,
            buffer: Arc::new(buffer),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.buffer.format
    }
}
