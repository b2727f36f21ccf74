//! One monitor: renderer thread, display surface, controller and proxy wired
//! together around a shared frame gate.
//!
//! Collaborators are injected at construction: the playback engine, the
//! profile accessor, the texture backend and the presenter. The owner drives
//! the UI side by calling [`Monitor::tick`] (or [`Monitor::tick_if_due`]) from
//! its refresh timer and hands [`Monitor::frame_sink`] to the engine.

use crate::config::MonitorConfig;
use crate::controller::{PlaybackController, PlaybackShared};
use crate::display::{DisplaySurface, PaintOutcome};
use crate::engine::{PlaybackEngine, ProfileProvider};
use crate::error::MonitorResult;
use crate::events::{self, EventReceiver};
use crate::proxy::MonitorProxy;
use crate::render_thread::RenderThreadPool;
use crate::renderer::{FrameRenderer, FrameSink, RendererEvent, RendererSettings, RendererState, SlotGate};
use crate::stats::{FrameStats, StatsSnapshot};
use crossbeam_channel::Receiver;
use cutscope_core::{Frame, Profile};
use cutscope_gpu::{Capabilities, Presenter, TextureBackend, TextureSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

pub struct Monitor {
    config: MonitorConfig,
    profile_provider: Arc<dyn ProfileProvider>,
    capabilities: Capabilities,
    pool: RenderThreadPool,
    renderer: FrameRenderer,
    renderer_events: Receiver<RendererEvent>,
    controller: PlaybackController,
    display: DisplaySurface,
    proxy: MonitorProxy,
    stats: Arc<FrameStats>,
    analysis: Option<Receiver<Frame>>,
    last_paint: Option<Instant>,
    shut_down: bool,
}

impl Monitor {
    /// Build a monitor and start its threads.
    ///
    /// Returns the monitor and the receiving end of its event channel.
    pub fn new(
        config: MonitorConfig,
        engine: Arc<dyn PlaybackEngine>,
        profile_provider: Arc<dyn ProfileProvider>,
        backend: Arc<dyn TextureBackend>,
        presenter: Box<dyn Presenter>,
    ) -> MonitorResult<(Self, EventReceiver)> {
        config.validate()?;
        let profile = profile_provider.profile();
        profile.validate()?;

        let pool = RenderThreadPool::new(
            config.render_workers,
            Arc::clone(&backend),
            config.shutdown_timeout(),
        )?;
        let capabilities = pool
            .run_on_render_thread(|ctx| ctx.backend().capabilities())?
            .wait(config.shutdown_timeout())?;
        info!(
            backend = %capabilities.backend_name,
            max_texture_dimension = capabilities.max_texture_dimension,
            "Monitor backend probed"
        );

        let gate = Arc::new(SlotGate::new(
            (0..config.buffered_frames).map(|_| TextureSet::new()).collect(),
        ));
        let stats = Arc::new(FrameStats::new());
        let playback = Arc::new(PlaybackShared::new());
        let (events_tx, events_rx) = events::channel();
        let (renderer_tx, renderer_events) = crossbeam_channel::unbounded();

        let renderer = FrameRenderer::spawn(
            Arc::clone(&gate),
            backend,
            Arc::clone(&playback),
            Arc::clone(&stats),
            renderer_tx,
            RendererSettings::from_config(&config, capabilities.clone()),
        )?;
        let analysis = config.send_frame_for_analysis.then(|| renderer.enable_analysis());

        let proxy = MonitorProxy::new();
        proxy.set_frame_rate(profile.frame_rate);
        let controller = PlaybackController::new(
            engine,
            playback,
            renderer.control(),
            proxy.clone(),
            Arc::clone(&stats),
            events_tx.clone(),
            config.drop_frames,
            config.lost_frame_threshold,
        );
        let display = DisplaySurface::new(
            gate,
            presenter,
            Arc::clone(&stats),
            events_tx,
            profile,
            (config.min_zoom, config.max_zoom),
        );

        info!(
            width = profile.width,
            height = profile.height,
            rate = %profile.frame_rate,
            buffered = config.buffered_frames,
            "Monitor ready"
        );
        Ok((
            Self {
                config,
                profile_provider,
                capabilities,
                pool,
                renderer,
                renderer_events,
                controller,
                display,
                proxy,
                stats,
                analysis,
                last_paint: None,
                shut_down: false,
            },
            events_rx,
        ))
    }

    /// Entry point for frames produced by the engine.
    pub fn frame_sink(&self) -> FrameSink {
        self.renderer.sink()
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    pub fn display(&self) -> &DisplaySurface {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut DisplaySurface {
        &mut self.display
    }

    pub fn proxy(&self) -> MonitorProxy {
        self.proxy.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn renderer_state(&self) -> RendererState {
        self.renderer.state()
    }

    /// Frames offered for analysis, when enabled in the config.
    pub fn analysis_frames(&self) -> Option<&Receiver<Frame>> {
        self.analysis.as_ref()
    }

    /// Block until the renderer has nothing left to upload.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.renderer.wait_until_idle(timeout)
    }

    /// Hand renderer notifications to the controller, in arrival order.
    pub fn pump_events(&mut self) -> MonitorResult<usize> {
        let mut handled = 0;
        while let Ok(event) = self.renderer_events.try_recv() {
            handled += 1;
            match event {
                RendererEvent::FrameReady { position, pts, epoch } => {
                    if epoch == self.renderer.gate().epoch() {
                        self.controller.on_frame_ready(position, pts)?;
                    } else {
                        trace!(position, "notification for a flushed frame ignored");
                    }
                }
                RendererEvent::SeekServiced(position) => self.controller.on_seek_serviced(position)?,
                RendererEvent::ZoneEndReached => self.controller.on_zone_end()?,
                RendererEvent::FrameLost { total } => self.controller.on_frame_lost(total),
                RendererEvent::Fatal(reason) => return Err(self.controller.on_fatal(reason)),
            }
        }
        Ok(handled)
    }

    /// One refresh cycle: controller bookkeeping, then paint.
    pub fn tick(&mut self) -> MonitorResult<PaintOutcome> {
        self.pump_events()?;
        let outcome = self.display.paint()?;
        if outcome.new_frame.is_some() {
            self.controller.on_frame_presented(outcome.skipped)?;
        }
        self.last_paint = Some(Instant::now());
        Ok(outcome)
    }

    /// Tick if the refresh interval has elapsed since the last paint.
    pub fn tick_if_due(&mut self, now: Instant) -> MonitorResult<Option<PaintOutcome>> {
        let due = match self.last_paint {
            Some(last) => now.saturating_duration_since(last) >= self.refresh_interval(),
            None => true,
        };
        if !due {
            return Ok(None);
        }
        self.tick().map(Some)
    }

    pub fn refresh_interval(&self) -> Duration {
        self.config.refresh_interval(self.display.profile().frame_rate)
    }

    /// Re-read the profile and drop every texture so the next frames are
    /// uploaded into freshly allocated ones.
    pub fn reconfigure(&mut self) -> MonitorResult<Profile> {
        let profile = self.profile_provider.profile();
        profile.validate()?;
        self.controller.stop()?;
        self.renderer.flush()?;

        let gate = Arc::clone(self.renderer.gate());
        self.pool
            .run_on_render_thread(move |ctx| {
                gate.clear_all(|set| set.release(ctx.backend()));
            })?
            .wait(self.config.shutdown_timeout())?;

        self.display.set_profile(profile);
        self.proxy.set_frame_rate(profile.frame_rate);
        info!(
            width = profile.width,
            height = profile.height,
            rate = %profile.frame_rate,
            "Monitor profile changed"
        );
        Ok(profile)
    }

    /// Stop playback and all threads. Textures are released on a render
    /// worker. Safe to call more than once.
    pub fn shutdown(&mut self) -> MonitorResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!("Monitor shutting down");

        if let Err(e) = self.controller.stop() {
            warn!("Stop during shutdown failed: {e}");
        }
        let mut result = self.renderer.shutdown();

        let gate = Arc::clone(self.renderer.gate());
        let released = self
            .pool
            .run_on_render_thread(move |ctx| {
                let mut count = 0;
                gate.for_each_buffer(|set| {
                    count += set.ids().len();
                    set.release(ctx.backend());
                });
                count
            })
            .and_then(|task| task.wait(self.config.shutdown_timeout()));
        match released {
            Ok(count) => info!(textures = count, "Monitor textures released"),
            Err(e) => {
                error!("Texture teardown failed: {e}");
                result = result.and(Err(e));
            }
        }

        if let Err(e) = self.pool.shutdown() {
            result = result.and(Err(e));
        }
        result
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Monitor shutdown failed: {e}");
        }
    }
}
