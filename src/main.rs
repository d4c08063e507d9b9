use std::sync::Arc;

use anyhow::Context;
use args::Args;
use clap::Parser as _;
use config::Config;
use device_log::DeviceLog;
use firestore::Firestore;
use log::LevelFilter;
use rand::{SeedableRng, rngs::StdRng};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use simulator::Simulator;

mod args;
mod config;
mod device_log;
mod firestore;
mod generator;
mod reading;
mod shutdown;
mod simulator;
mod store;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    TermLogger::init(
        LevelFilter::Info,
        ConfigBuilder::new()
            .set_time_format_rfc3339()
            .set_time_offset_to_local()
            .map_err(|_| anyhow::anyhow!("Failed to set time offset to local"))?
            .build(),
        TerminalMode::Stdout,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;

    if let Err(e) = run().await {
        log::error!("{e:#}");
    }

    Ok(())
}

pub async fn run() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let config = Config::new(args.credentials);

    let device_log = DeviceLog::new(config.logs_dir.clone());
    device_log
        .init()
        .context("Failed to initialize device logs")?;

    let firestore = Firestore::connect(&config.credentials)
        .context("Failed to initialize Firestore client")?;
    log::info!("Using Firestore project {}", firestore.project_id());

    let mut simulator = Simulator::new(
        config.clone(),
        device_log,
        StdRng::from_entropy(),
        Arc::new(firestore),
    );

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Stopped by user."),
            Err(e) => log::error!("Failed to wait for Ctrl+C signal: {e}"),
        }
        trigger.trigger();
    });

    log::info!(
        "Starting AQI data simulation for {} devices every {:?}",
        config.devices.len(),
        config.interval
    );

    simulator.run(shutdown).await
}
