//! Boundary to the external playback engine.
//!
//! The engine decodes and produces frames on its own threads and hands them to
//! the monitor through a [`FrameSink`](crate::renderer::FrameSink). The monitor
//! drives it with transport commands through [`PlaybackEngine`].

use cutscope_core::Profile;
use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error reported by the playback engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Identifies the clip or timeline the engine is producing frames for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProducerHandle {
    pub id: Uuid,
    pub name: String,
}

impl ProducerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Transport commands understood by the playback engine.
///
/// Commands are issued from the UI thread only. Implementations must not call
/// back into the monitor synchronously from inside a command.
pub trait PlaybackEngine: Send + Sync {
    /// Load a producer. `position` is where to park the playhead, if anywhere.
    fn set_producer(
        &self,
        producer: &ProducerHandle,
        is_active: bool,
        position: Option<i64>,
    ) -> EngineResult<()>;

    /// Start producing at `speed` (frames per frame; negative is reverse).
    fn play(&self, speed: Rational64) -> EngineResult<()>;

    fn pause(&self) -> EngineResult<()>;

    /// Produce the frame at `position` next.
    fn seek(&self, position: i64) -> EngineResult<()>;

    fn stop(&self) -> EngineResult<()>;

    /// Length of the current producer in frames.
    fn duration(&self) -> i64;

    fn profile(&self) -> Profile;

    /// Skip decoding frames that cannot be shown in time.
    fn set_frame_skipping(&self, _enabled: bool) -> EngineResult<()> {
        Ok(())
    }
}

/// Read access to the project profile.
pub trait ProfileProvider: Send + Sync {
    fn profile(&self) -> Profile;
}

/// A fixed profile.
#[derive(Debug, Clone, Copy)]
pub struct StaticProfile(pub Profile);

impl ProfileProvider for StaticProfile {
    fn profile(&self) -> Profile {
        self.0
    }
}
