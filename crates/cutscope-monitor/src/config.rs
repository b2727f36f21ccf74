//! Monitor configuration.

use crate::error::{MonitorError, MonitorResult};
use cutscope_core::{memory_budget, FrameRate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When to ask the engine to skip decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropFrameConfig {
    /// Let the engine skip frames at all.
    pub enabled: bool,
    /// Dropped frames per window that switch skipping on.
    pub threshold: u32,
    /// Presented frames per measurement window.
    pub window_frames: u32,
}

impl Default for DropFrameConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            window_frames: 25,
        }
    }
}

/// Configuration of one monitor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Frames buffered between renderer and display (2 or 3).
    pub buffered_frames: usize,
    /// Paint timer rate. `None` follows the profile frame rate.
    pub refresh_rate_hz: Option<f64>,
    pub drop_frames: DropFrameConfig,
    /// Consecutive texture allocation failures before playback is stopped.
    pub max_allocation_failures: u32,
    /// How long the renderer waits for a free slot before re-checking state.
    pub slot_wait_ms: u64,
    /// Bounded wait for workers and the renderer on shutdown and stop.
    pub shutdown_timeout_ms: u64,
    pub render_workers: usize,
    /// Lost frames per drop window before a `FrameLoss` event is raised.
    pub lost_frame_threshold: u64,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Offer every uploaded frame to the analysis sink.
    pub send_frame_for_analysis: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            buffered_frames: memory_budget::MAX_BUFFERED_FRAMES,
            refresh_rate_hz: None,
            drop_frames: DropFrameConfig::default(),
            max_allocation_failures: 2,
            slot_wait_ms: 50,
            shutdown_timeout_ms: 2000,
            render_workers: 1,
            lost_frame_threshold: 10,
            min_zoom: 0.125,
            max_zoom: 8.0,
            send_frame_for_analysis: false,
        }
    }
}

impl MonitorConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> MonitorResult<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> MonitorResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if !(2..=memory_budget::MAX_BUFFERED_FRAMES).contains(&self.buffered_frames) {
            return Err(MonitorError::Config(format!(
                "buffered_frames must be 2..={}, got {}",
                memory_budget::MAX_BUFFERED_FRAMES,
                self.buffered_frames
            )));
        }
        if let Some(hz) = self.refresh_rate_hz {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(MonitorError::Config(format!("refresh_rate_hz must be positive, got {hz}")));
            }
        }
        if self.drop_frames.window_frames == 0 || self.drop_frames.threshold == 0 {
            return Err(MonitorError::Config(
                "drop_frames.window_frames and drop_frames.threshold must be non-zero".into(),
            ));
        }
        if self.max_allocation_failures == 0 {
            return Err(MonitorError::Config("max_allocation_failures must be non-zero".into()));
        }
        if self.render_workers == 0 {
            return Err(MonitorError::Config("render_workers must be non-zero".into()));
        }
        if !(self.min_zoom > 0.0 && self.min_zoom <= 1.0 && self.max_zoom >= 1.0) {
            return Err(MonitorError::Config(format!(
                "zoom range {}..{} must contain 1.0 and be positive",
                self.min_zoom, self.max_zoom
            )));
        }
        Ok(())
    }

    /// Interval of the paint timer for a given profile rate.
    pub fn refresh_interval(&self, rate: FrameRate) -> Duration {
        match self.refresh_rate_hz {
            Some(hz) => Duration::from_secs_f64(1.0 / hz),
            None => rate.frame_interval(),
        }
    }

    pub fn slot_wait(&self) -> Duration {
        Duration::from_millis(self.slot_wait_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
