// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use camera_streamer::{
    args::Args,
    config::{BufferRegion, SensorConfig, Timings},
    gpio::open_line,
    probe::{MemoryMonitor, SystemMemory},
    recovery::{BusRecovery, PowerSequencer},
    server::{self, AppState},
    session::SensorSession,
    v4l2::V4l2Driver,
};
use clap::Parser;
use std::{error::Error, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }))
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    tracing_log::LogTracer::init()?;

    let console = args
        .tokio_console
        .then(|| console_subscriber::ConsoleLayer::builder().with_default_env().spawn());
    let journald = if args.journald {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer.with_filter(env_filter(args.verbose))),
            Err(e) => {
                eprintln!("journald unavailable, logging to stderr only: {e}");
                None
            }
        }
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(console)
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter(args.verbose)))
        .with(journald);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;
    info!(version = env!("CARGO_PKG_VERSION"), "camera streamer starting");

    let config = SensorConfig::from(&args);
    let timings = Timings::from(&args);
    let memory = Arc::new(SystemMemory::default());
    info!(
        free_int = memory.free_bytes(BufferRegion::Internal),
        free_psram = memory.free_bytes(BufferRegion::External),
        "memory available"
    );

    let bus = BusRecovery::new(
        open_line(config.pins.sccb_sda)?,
        open_line(config.pins.sccb_scl)?,
        timings.bus_half_period,
    );
    let power = PowerSequencer::new(
        open_line(config.pins.pwdn)?,
        open_line(config.pins.reset)?,
        timings.power_settle,
    );
    let driver = V4l2Driver::new(&args.device).with_frame_timeout(args.frame_timeout());
    let mut session = SensorSession::new(Box::new(driver), bus, power, config, timings);

    // A failed start leaves the pipeline degraded, /reinit can retry later
    let session = tokio::task::spawn_blocking(move || {
        if let Err(e) = session.reinitialize() {
            error!("camera start failed: {e}");
        }
        session
    })
    .await?;
    info!(state = %session.state(), "camera pipeline started");

    let app = AppState::new(session, memory);
    let listener = TcpListener::bind(args.bind).await?;
    server::serve(listener, app).await?;
    Ok(())
}
