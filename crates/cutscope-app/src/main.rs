//! CutScope - headless monitor driver
//!
//! Plays a synthetic producer through the full monitor pipeline and reports
//! frame statistics.
//!
//! ```text
//! cutscope [--gpu] [--config PATH] [--zone START:END] [--loop] [--seconds N]
//! ```

mod synthetic;

use anyhow::{bail, Context, Result};
use cutscope_core::{FrameRate, Profile, Zone};
use cutscope_gpu::{CpuBackend, GpuContext, Presenter, RecordingPresenter, TextureBackend, WgpuBackend, WgpuPresenter};
use cutscope_monitor::{Monitor, MonitorConfig, MonitorEvent, ProducerHandle, StaticProfile};
use num_rational::Rational64;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use synthetic::SyntheticEngine;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const DURATION_FRAMES: i64 = 250;

#[derive(Debug, Default)]
struct Options {
    gpu: bool,
    config: Option<PathBuf>,
    zone: Option<Zone>,
    looping: bool,
    seconds: Option<f64>,
}

fn parse_args() -> Result<Options> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--gpu" => options.gpu = true,
            "--loop" => options.looping = true,
            "--config" => {
                options.config = Some(args.next().context("--config needs a path")?.into());
            }
            "--zone" => {
                let value = args.next().context("--zone needs START:END")?;
                let (start, end) = value
                    .split_once(':')
                    .context("--zone expects START:END")?;
                options.zone = Some(Zone::new(start.parse()?, end.parse()?));
            }
            "--seconds" => {
                options.seconds = Some(args.next().context("--seconds needs a value")?.parse()?);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = parse_args()?;
    info!("CutScope starting...");

    let config = match &options.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => MonitorConfig::default(),
    };
    let profile = Profile::new(640, 360, FrameRate::FPS_25);

    let (backend, presenter): (Arc<dyn TextureBackend>, Box<dyn Presenter>) = if options.gpu {
        let context = Arc::new(GpuContext::new_blocking()?);
        let info = context.adapter_info();
        info!(adapter = %info.name, backend = ?info.backend, "Using GPU");
        let wgpu_backend = Arc::new(WgpuBackend::new(context));
        let presenter: Box<dyn Presenter> = Box::new(WgpuPresenter::new(Arc::clone(&wgpu_backend)));
        let backend: Arc<dyn TextureBackend> = wgpu_backend;
        (backend, presenter)
    } else {
        let backend: Arc<dyn TextureBackend> = Arc::new(CpuBackend::new());
        let presenter: Box<dyn Presenter> = Box::new(RecordingPresenter::new());
        (backend, presenter)
    };

    let engine = Arc::new(SyntheticEngine::spawn(profile, DURATION_FRAMES)?);
    let (mut monitor, events) = Monitor::new(
        config,
        engine.clone(),
        Arc::new(StaticProfile(profile)),
        backend,
        presenter,
    )?;
    engine.attach(monitor.frame_sink());
    monitor.display_mut().resize(1280, 720);

    let controller = monitor.controller_mut();
    controller.set_producer(ProducerHandle::new("synthetic"), true, Some(0))?;
    match options.zone {
        Some(zone) => {
            controller.set_zone(Some(zone));
            if !controller.play_zone(options.looping)? {
                warn!(?zone, "Zone is empty, playing everything");
                controller.play(Rational64::from_integer(1))?;
            }
        }
        None if options.looping => {
            controller.loop_clip()?;
        }
        None => controller.play(Rational64::from_integer(1))?,
    }

    let run_for = Duration::from_secs_f64(options.seconds.unwrap_or(4.0));
    let deadline = Instant::now() + run_for;
    while Instant::now() < deadline {
        monitor.tick_if_due(Instant::now())?;
        for event in events.try_iter() {
            match event {
                MonitorEvent::PositionChanged(_) | MonitorEvent::FrameDisplayed { .. } => {}
                MonitorEvent::Stopped { error: Some(reason) } => warn!("Playback stopped: {reason}"),
                other => debug!(?other, "Monitor event"),
            }
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    let proxy = monitor.proxy();
    let stats = monitor.stats();
    info!(
        position = proxy.position(),
        timecode = %proxy.timecode(),
        received = stats.received,
        uploaded = stats.uploaded,
        presented = stats.presented,
        dropped = stats.dropped,
        lost = stats.lost,
        "Playback finished"
    );
    monitor.shutdown()?;
    Ok(())
}
