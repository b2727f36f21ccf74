//! Error types for the monitor.

use cutscope_core::CutScopeError;
use thiserror::Error;

/// Errors surfaced by monitor operations.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Core(#[from] CutScopeError),

    /// The playback engine refused a command.
    #[error("Playback engine refused {command}: {reason}")]
    Engine { command: &'static str, reason: String },

    /// GPU memory ran out while (re)allocating textures. Playback was stopped.
    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    /// A command arrived in a state where it can never be valid.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// A render worker did not finish within the shutdown window.
    #[error("Render worker {worker} did not stop within {timeout_ms} ms")]
    ShutdownTimeout { worker: String, timeout_ms: u64 },

    #[error("Render worker {0} panicked")]
    WorkerPanicked(String),

    /// The frame renderer did not acknowledge a flush in time.
    #[error("Frame renderer did not reach idle within {0} ms")]
    RendererStalled(u64),

    /// A render task was dropped before it ran.
    #[error("Render task cancelled")]
    TaskCancelled,

    /// A render task did not report back in time.
    #[error("Render task on {worker} did not finish within {timeout_ms} ms")]
    TaskTimeout { worker: String, timeout_ms: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether the error ended the playback session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted(_) | Self::ShutdownTimeout { .. } | Self::WorkerPanicked(_)
        )
    }
}

/// Result type alias for monitor operations.
pub type MonitorResult<T> = std::result::Result<T, MonitorError>;
