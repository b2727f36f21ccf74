//! Geometric primitives for display layout and view transforms.

use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Mat3, Vec2 as GlamVec2};
use serde::{Deserialize, Serialize};

/// 2D vector.
pub type Vec2 = GlamVec2;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin.
    #[inline]
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Minimum corner (top-left).
    #[inline]
    pub fn min(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Maximum corner (bottom-right).
    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    #[inline]
    pub fn size(self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Check if a point is inside the rectangle.
    #[inline]
    pub fn contains(self, point: Vec2) -> bool {
        point.x >= self.x
            && point.x < self.x + self.width
            && point.y >= self.y
            && point.y < self.y + self.height
    }

    /// Compute intersection with another rectangle.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        if x1 < x2 && y1 < y2 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Largest rectangle of the given aspect ratio centred inside `self`.
    ///
    /// The remaining space becomes letterbox (top/bottom) or pillarbox
    /// (left/right) bars. Pixel coordinates are rounded so the result
    /// always lands on whole pixels.
    pub fn fit_aspect(self, aspect: f32) -> Self {
        if self.is_empty() || !aspect.is_finite() || aspect <= 0.0 {
            return Self::new(self.x, self.y, 0.0, 0.0);
        }
        let (width, height) = if self.width / self.height > aspect {
            ((self.height * aspect).round().min(self.width), self.height)
        } else {
            (self.width, (self.width / aspect).round().min(self.height))
        };
        Self::new(
            self.x + ((self.width - width) * 0.5).floor(),
            self.y + ((self.height - height) * 0.5).floor(),
            width,
            height,
        )
    }

    /// Express `self` relative to `frame` in the unit square.
    pub fn normalized_in(self, frame: Self) -> Self {
        if frame.is_empty() {
            return Self::default();
        }
        Self::new(
            (self.x - frame.x) / frame.width,
            (self.y - frame.y) / frame.height,
            self.width / frame.width,
            self.height / frame.height,
        )
    }
}

/// 2D affine transformation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    inner: Affine2,
}

impl Transform2D {
    pub const IDENTITY: Self = Self {
        inner: Affine2::IDENTITY,
    };

    #[inline]
    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            inner: Affine2::from_translation(Vec2::new(x, y)),
        }
    }

    #[inline]
    pub fn scale(x: f32, y: f32) -> Self {
        Self {
            inner: Affine2::from_scale(Vec2::new(x, y)),
        }
    }

    #[inline]
    pub fn scale_uniform(s: f32) -> Self {
        Self::scale(s, s)
    }

    /// Combine two transforms; `other` is applied first.
    #[inline]
    pub fn then(self, other: Self) -> Self {
        Self {
            inner: self.inner * other.inner,
        }
    }

    #[inline]
    pub fn transform_point(self, point: Vec2) -> Vec2 {
        self.inner.transform_point2(point)
    }

    #[inline]
    pub fn inverse(self) -> Self {
        Self {
            inner: self.inner.inverse(),
        }
    }

    /// Convert to a 3x3 homogeneous matrix for GPU upload.
    pub fn to_mat3(self) -> Mat3 {
        self.inner.into()
    }

    /// Uniform scale factor along x.
    pub fn scale_x(&self) -> f32 {
        self.inner.matrix2.x_axis.x
    }

    pub fn translation(&self) -> Vec2 {
        self.inner.translation
    }
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}
