//! Read-mostly view of the monitor for UI chrome (ruler, timecode, markers).

use cutscope_core::{FrameRate, Zone};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A guide marker shown on the ruler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub position: i64,
    pub comment: String,
    pub category: u32,
}

impl Marker {
    pub fn new(position: i64, comment: impl Into<String>) -> Self {
        Self {
            position,
            comment: comment.into(),
            category: 0,
        }
    }
}

#[derive(Debug, Default)]
struct ProxyState {
    position: i64,
    duration: i64,
    markers: Vec<Marker>,
    zone: Option<Zone>,
    frame_rate: FrameRate,
}

/// Cheap to clone; all clones observe the same state.
///
/// Only the playback controller writes. Before any producer is loaded every
/// query returns the defaults: position 0, duration 0, no markers.
#[derive(Debug, Clone, Default)]
pub struct MonitorProxy {
    state: Arc<RwLock<ProxyState>>,
}

impl MonitorProxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> i64 {
        self.state.read().position
    }

    pub fn duration(&self) -> i64 {
        self.state.read().duration
    }

    pub fn markers(&self) -> Vec<Marker> {
        self.state.read().markers.clone()
    }

    pub fn zone(&self) -> Option<Zone> {
        self.state.read().zone
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.state.read().frame_rate
    }

    /// Playhead as `HH:MM:SS:FF`.
    pub fn timecode(&self) -> String {
        let state = self.state.read();
        state.frame_rate.timecode(state.position)
    }

    pub fn marker_at(&self, position: i64) -> Option<Marker> {
        self.state
            .read()
            .markers
            .iter()
            .find(|m| m.position == position)
            .cloned()
    }

    /// First marker strictly after the playhead.
    pub fn next_marker(&self) -> Option<Marker> {
        let state = self.state.read();
        state
            .markers
            .iter()
            .find(|m| m.position > state.position)
            .cloned()
    }

    /// Last marker strictly before the playhead.
    pub fn previous_marker(&self) -> Option<Marker> {
        let state = self.state.read();
        state
            .markers
            .iter()
            .rev()
            .find(|m| m.position < state.position)
            .cloned()
    }

    pub(crate) fn set_position(&self, position: i64) {
        self.state.write().position = position;
    }

    pub(crate) fn set_duration(&self, duration: i64) {
        self.state.write().duration = duration;
    }

    pub(crate) fn set_zone(&self, zone: Option<Zone>) {
        self.state.write().zone = zone;
    }

    pub(crate) fn set_frame_rate(&self, rate: FrameRate) {
        self.state.write().frame_rate = rate;
    }

    pub(crate) fn set_ruler_info(&self, duration: i64, mut markers: Vec<Marker>) {
        markers.sort_by_key(|m| m.position);
        let mut state = self.state.write();
        state.duration = duration;
        state.markers = markers;
    }

    pub(crate) fn reset(&self) {
        *self.state.write() = ProxyState::default();
    }
}
