//! Time representation for frame-accurate playback
//!
//! Uses rational numbers to avoid floating-point accumulation errors.
//! Positions on the timeline are plain frame indices (`i64`).

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A rational time value representing a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RationalTime {
    /// Time value as a rational number (seconds)
    value: Rational64,
}

impl RationalTime {
    /// Create a new RationalTime of `numerator / denominator` seconds.
    #[inline]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            value: Rational64::new(numerator, denominator),
        }
    }

    /// Create a RationalTime from a frame number and frame rate.
    #[inline]
    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self {
            value: Rational64::new(frames * rate.denominator as i64, rate.numerator as i64),
        }
    }

    /// Convert to seconds as f64.
    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.value.numer() as f64 / *self.value.denom() as f64
    }

    /// Convert to frame number at the given frame rate (floored).
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        let frames = self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames.floor().to_integer()
    }

    /// Zero time constant.
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl Sub for RationalTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
        }
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds_f64())
    }
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator.max(1) as f64
    }

    /// Wall-clock duration of a single frame.
    pub fn frame_interval(self) -> Duration {
        let fps = self.to_fps_f64();
        if fps <= 0.0 {
            return Duration::from_millis(40);
        }
        Duration::from_secs_f64(1.0 / fps)
    }

    /// Whether both parts are non-zero.
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Format a frame index as `HH:MM:SS:FF` (non-drop-frame).
    pub fn timecode(self, frames: i64) -> String {
        let fps = (self.to_fps_f64().round() as i64).max(1);
        let sign = if frames < 0 { "-" } else { "" };
        let frames = frames.abs();
        let ff = frames % fps;
        let total_secs = frames / fps;
        format!(
            "{sign}{:02}:{:02}:{:02}:{:02}",
            total_secs / 3600,
            (total_secs / 60) % 60,
            total_secs % 60,
            ff
        )
    }

    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// A half-open range of frames `[start, end)` used for restricted playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    pub start: i64,
    pub end: i64,
}

impl Zone {
    #[inline]
    pub const fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Number of frames in the zone.
    #[inline]
    pub fn len(self) -> i64 {
        (self.end - self.start).max(0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn contains(self, position: i64) -> bool {
        position >= self.start && position < self.end
    }

    /// Last frame inside the zone, if any.
    #[inline]
    pub fn last_frame(self) -> Option<i64> {
        (!self.is_empty()).then_some(self.end - 1)
    }

    /// Restrict the zone to `[0, duration)`.
    pub fn clamped(self, duration: i64) -> Self {
        let start = self.start.clamp(0, duration.max(0));
        let end = self.end.clamp(start, duration.max(0));
        Self { start, end }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_time_frames() {
        let rate = FrameRate::FPS_24;
        let time = RationalTime::from_frames(48, rate);
        assert_eq!(time.to_seconds_f64(), 2.0);
        assert_eq!(time.to_frames(rate), 48);
    }

    #[test]
    fn test_frame_rate_23_976() {
        let fps = FrameRate::FPS_23_976.to_fps_f64();
        assert!((fps - 23.976).abs() < 0.001);
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(FrameRate::FPS_25.frame_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_timecode() {
        assert_eq!(FrameRate::FPS_25.timecode(0), "00:00:00:00");
        assert_eq!(FrameRate::FPS_25.timecode(25 * 61 + 3), "00:01:01:03");
        assert_eq!(FrameRate::FPS_24.timecode(24 * 3600), "01:00:00:00");
    }

    #[test]
    fn test_zone_bounds() {
        let zone = Zone::new(100, 200);
        assert!(zone.contains(100));
        assert!(zone.contains(199));
        assert!(!zone.contains(200));
        assert_eq!(zone.last_frame(), Some(199));
        assert_eq!(Zone::new(5, 5).last_frame(), None);
        assert_eq!(Zone::new(-10, 5000).clamped(1000), Zone::new(0, 1000));
        assert!(Zone::new(10, 20).clamped(0).is_empty());
    }
}
