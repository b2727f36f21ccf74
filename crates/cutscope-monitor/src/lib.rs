//! CutScope Monitor - frame rendering and display synchronization
//!
//! Three execution contexts meet here:
//! - the playback engine's threads, which deliver frames through a [`FrameSink`]
//! - the frame renderer thread, which uploads them into GPU textures
//! - the UI thread, which paints the newest frame at a fixed refresh rate
//!
//! Frames pass from renderer to display through the latest-wins [`FrameGate`].
//! Notifications travel in order over channels.

pub mod config;
pub mod controller;
pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod gate;
pub mod monitor;
pub mod proxy;
pub mod render_thread;
pub mod renderer;
pub mod stats;

pub use config::{DropFrameConfig, MonitorConfig};
pub use controller::{DropFramePolicy, PlaybackController, PlaybackShared, PlaybackState, PlaybackStatus};
pub use display::{DisplaySurface, PaintOutcome};
pub use engine::{EngineError, EngineResult, PlaybackEngine, ProducerHandle, ProfileProvider, StaticProfile};
pub use error::{MonitorError, MonitorResult};
pub use events::{EventReceiver, EventSender, Modifiers, MonitorEvent};
pub use gate::{Consumed, FrameGate, FrameStamp, GateError, SlotWriter};
pub use monitor::Monitor;
pub use proxy::{Marker, MonitorProxy};
pub use render_thread::{RenderContext, RenderThreadPool, TaskHandle};
pub use renderer::{
    FrameRenderer, FrameSink, RendererControl, RendererEvent, RendererSettings, RendererState, SlotGate,
};
pub use stats::{FrameStats, StatsSnapshot};
