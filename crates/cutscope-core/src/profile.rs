//! Project profile: frame geometry, rate and pixel aspect.

use crate::error::{CutScopeError, Result};
use crate::time::FrameRate;
use serde::{Deserialize, Serialize};

/// YUV to RGB conversion matrix used when presenting planar frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorMatrix {
    /// ITU-R BT.601 (SD)
    Bt601,
    /// ITU-R BT.709 (HD)
    #[default]
    Bt709,
}

impl ColorMatrix {
    /// Limited-range YUV to RGB coefficients as three rows of
    /// `[y, u, v, offset]`, with u and v centred on zero.
    ///
    /// `rgb = row · (y, u - 0.5, v - 0.5, 1)`
    pub fn coefficients(self) -> [[f32; 4]; 3] {
        const Y_SCALE: f32 = 255.0 / 219.0;
        const Y_OFFSET: f32 = -16.0 / 219.0;
        let (rv, gu, gv, bu) = match self {
            Self::Bt601 => (1.596, -0.392, -0.813, 2.017),
            Self::Bt709 => (1.793, -0.213, -0.533, 2.112),
        };
        [
            [Y_SCALE, 0.0, rv, Y_OFFSET],
            [Y_SCALE, gu, gv, Y_OFFSET],
            [Y_SCALE, bu, 0.0, Y_OFFSET],
        ]
    }

    /// Pick the conventional matrix for a frame height.
    pub fn for_height(height: u32) -> Self {
        if height >= 720 {
            Self::Bt709
        } else {
            Self::Bt601
        }
    }
}

/// Frame geometry and timing of the current project.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Sample (pixel) aspect ratio numerator.
    pub sample_aspect_num: u32,
    /// Sample (pixel) aspect ratio denominator.
    pub sample_aspect_den: u32,
    pub progressive: bool,
    pub color_matrix: ColorMatrix,
}

impl Profile {
    pub fn new(width: u32, height: u32, frame_rate: FrameRate) -> Self {
        Self {
            width,
            height,
            frame_rate,
            sample_aspect_num: 1,
            sample_aspect_den: 1,
            progressive: true,
            color_matrix: ColorMatrix::for_height(height),
        }
    }

    /// 1920x1080 progressive at 25 fps.
    pub fn hd1080p25() -> Self {
        Self::new(1920, 1080, FrameRate::FPS_25)
    }

    /// PAL DV: 720x576 interlaced with 16:15 pixels.
    pub fn dv_pal() -> Self {
        Self {
            sample_aspect_num: 16,
            sample_aspect_den: 15,
            progressive: false,
            ..Self::new(720, 576, FrameRate::FPS_25)
        }
    }

    /// Pixel aspect ratio as a float.
    pub fn sample_aspect_ratio(&self) -> f32 {
        self.sample_aspect_num as f32 / self.sample_aspect_den.max(1) as f32
    }

    /// Display aspect ratio: frame aspect corrected by the pixel aspect.
    pub fn display_aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 * self.sample_aspect_ratio() / self.height as f32
    }

    /// Size of the frame in display (square) pixels.
    pub fn display_size(&self) -> (u32, u32) {
        let width = (self.height as f32 * self.display_aspect_ratio()).round() as u32;
        (width, self.height)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CutScopeError::InvalidParameter(format!(
                "profile size {}x{} is empty",
                self.width, self.height
            )));
        }
        if !self.frame_rate.is_valid() {
            return Err(CutScopeError::InvalidParameter(format!(
                "profile frame rate {}/{} is not usable",
                self.frame_rate.numerator, self.frame_rate.denominator
            )));
        }
        if self.sample_aspect_num == 0 || self.sample_aspect_den == 0 {
            return Err(CutScopeError::InvalidParameter(
                "sample aspect ratio must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::hd1080p25()
    }
}
