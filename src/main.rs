//! CanSat payload entry point.
//!
//! Startup order:
//! 1. load and validate configuration, initialize logging
//! 2. mount storage volumes (failures leave the volume unmounted)
//! 3. advance the run counter (failures fall back to run 0)
//! 4. open the radio (failures leave the uplink disabled)
//! 5. construct sensors (failures drop that sensor)
//! 6. start the pipeline and run until Ctrl-C
//!
//! # Usage
//!
//! ```bash
//! cansat_telemetry --config config/telemetry.toml
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

use cansat_telemetry::config::{TelemetryConfig, DEFAULT_CONFIG_PATH};
use cansat_telemetry::logging;
use cansat_telemetry::pipeline::Pipeline;
use cansat_telemetry::radio::{RadioUplink, UdpTransport};
use cansat_telemetry::run_registry::RunRegistry;
use cansat_telemetry::sensor::build_sources;
use cansat_telemetry::storage::{DirectoryVolume, StorageFanout};

#[derive(Parser)]
#[command(name = "cansat_telemetry")]
#[command(about = "CanSat payload telemetry: sample, store, transmit", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TelemetryConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    info!(name = %config.application.name, config = %cli.config.display(), "Payload starting");

    let mut storage = StorageFanout::new();
    for volume in &config.storage.volumes {
        storage.add(volume.name.clone(), Box::new(DirectoryVolume::new(&volume.root)));
    }
    let mounted = storage.mount_all().await;

    let run = RunRegistry::new(&config.registry.path).advance_or_fallback();

    let radio = open_radio(&config).await;
    let sources = build_sources(&config.sensors, &mounted);

    let handle = Pipeline::new(&config, run, sources, storage, radio).spawn();

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Unable to listen for Ctrl-C, stopping");
    }
    info!("Shutdown requested");

    let stats = handle.shutdown().await?;
    info!(
        run,
        sampled = stats.sampler.readings,
        dispatched = stats.dispatcher.readings,
        "Payload stopped"
    );
    Ok(())
}

async fn open_radio(config: &TelemetryConfig) -> RadioUplink {
    if !config.radio.enabled {
        info!("Radio disabled in configuration");
        return RadioUplink::disabled();
    }

    match UdpTransport::from_config(&config.radio).await {
        Ok(transport) => {
            info!(station = %config.radio.station, "Radio uplink ready");
            RadioUplink::new(Box::new(transport), config.radio.server_address)
        }
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Radio unavailable, continuing without uplink");
            RadioUplink::disabled()
        }
    }
}
