//! lapse: webcam MJPEG streaming and timelapse capture

mod cli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lapse::annotate::AnnotationControl;
use lapse::capture::{V4l2Capture, V4l2Controls};
use lapse::pipeline::{spawn_capture, FrameDistributor};
use lapse::server::{self, AppContext, PageInfo};
use lapse::timelapse::{device_short_name, TimelapseWriter};
use lapse::{utils, Config};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lapse=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve(args) => {
            // Without a config file, start from whatever the device is set to
            if cli.config.is_none() {
                let probe = args
                    .device
                    .device
                    .clone()
                    .unwrap_or_else(|| config.capture.device.clone());
                if let Some(defaults) = utils::probe_defaults(&probe) {
                    cli::apply_device_defaults(&mut config, defaults);
                }
            }
            args.apply(&mut config);
            resolve_device(&mut config)?;
            run_serve(config).await
        }
        Command::Capture(args) => {
            args.apply(&mut config);
            resolve_device(&mut config)?;
            run_capture(config).await
        }
    }
}

fn resolve_device(config: &mut Config) -> Result<()> {
    if config.capture.device.is_empty() {
        config.capture.device = utils::auto_detect_device()?;
    }
    info!("Using capture device: {}", config.capture.device);
    Ok(())
}

async fn run_serve(config: Config) -> Result<()> {
    let annotation = Arc::new(AnnotationControl::from_config(&config.annotation));

    let capture = V4l2Capture::open(&config.capture)?;
    let negotiated = capture.negotiated().clone();
    let controls = Arc::new(V4l2Controls::open(&config.capture.device)?);

    let frames = FrameDistributor::new(config.pipeline.distributor_capacity);
    let running = Arc::new(AtomicBool::new(true));
    let pump = spawn_capture(capture, frames.clone(), running.clone())?;
    info!(
        "device capture started (buffer size set {})",
        negotiated.buffer_count
    );

    let ctx = Arc::new(AppContext {
        frames,
        controls,
        annotation,
        page: PageInfo {
            stream_info: negotiated.stream_info(),
            width: negotiated.width,
            height: negotiated.height,
        },
    });

    let addr = server::listen_addr(&config.server.port)
        .map_err(|e| eyre!("invalid port {:?}: {}", config.server.port, e))?;

    let result: Result<()> = tokio::select! {
        served = server::serve(ctx, addr) => served.map_err(Into::into),
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            Ok(())
        }
    };

    stop_capture(pump, &running).await;
    info!("lapse shutting down");
    result
}

async fn run_capture(config: Config) -> Result<()> {
    let annotation = Arc::new(AnnotationControl::from_config(&config.annotation));
    if config.annotation.enabled && !annotation.enable() {
        warn!("saving frames without face annotation");
    }

    let capture = V4l2Capture::open(&config.capture)?;
    let negotiated = capture.negotiated().clone();
    info!(
        "Capturing {} frames (buffers: {}, {} fps)...",
        config.timelapse.count, negotiated.buffer_count, negotiated.fps
    );

    let (tx, rx) = flume::bounded(config.pipeline.channel_capacity);
    let running = Arc::new(AtomicBool::new(true));
    let pump = spawn_capture(capture, tx, running.clone())?;

    let writer = TimelapseWriter {
        output_dir: config.timelapse.output_dir.clone(),
        device_name: device_short_name(&config.capture.device).to_string(),
        count: config.timelapse.count,
        annotation,
    };

    let mut job = tokio::task::spawn_blocking(move || writer.run(&rx));
    tokio::select! {
        summary = &mut job => {
            let summary = summary?;
            info!(
                "Done. {} frames seen, {} saved, {} skipped",
                summary.seen, summary.saved, summary.skipped
            );
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    // Stopping the pump closes the channel, which ends the writer if it is still running
    stop_capture(pump, &running).await;
    Ok(())
}

async fn stop_capture(pump: JoinHandle<()>, running: &AtomicBool) {
    running.store(false, Ordering::SeqCst);
    match tokio::task::spawn_blocking(move || pump.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("capture thread panicked"),
        Err(e) => error!("failed to join capture thread: {}", e),
    }
}
