//! Prasaran - telemetry relay daemon
//!
//! ## Ports
//!
//! - **UDP (port 1701)**: instrument datagram feed (DATA / POST / EXIT codes)
//! - **TCP (port 1702)**: viewers; each connection names one stream
//!
//! The datagram listener starts with the first `data` viewer (or at boot
//! with `[ingress] autostart = true`) and stops when the feed sends EXIT.

use clap::Parser;
use prasaran::broadcast::{ChannelRegistry, stream};
use prasaran::config::{AppConfig, SensorSourceKind};
use prasaran::error::{Error, Result};
use prasaran::ingress::{IngressListener, TextReport};
use prasaran::streaming::ViewerServer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Used when no `--config` is given and the file exists
const DEFAULT_CONFIG_PATH: &str = "/etc/prasaran.toml";

/// Telemetry relay daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (default: /etc/prasaran.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the UDP ingress port
    #[arg(long)]
    port: Option<u16>,

    /// Override the viewer TCP bind address (e.g. "0.0.0.0:1702")
    #[arg(long)]
    viewer_address: Option<String>,
}

fn load_config(args: &Args) -> Result<(AppConfig, Option<PathBuf>)> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| Path::new(p).exists()),
    };
    let mut config = match &path {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    if let Some(port) = args.port {
        config.ingress.port = port;
    }
    if let Some(address) = &args.viewer_address {
        config.viewer.bind_address = address.clone();
    }
    config.validate()?;
    Ok((config, path))
}

#[cfg(feature = "mock")]
mod local {
    use prasaran::broadcast::{ChannelRegistry, stream};
    use prasaran::config::AppConfig;
    use prasaran::error::Result;
    use prasaran::sensors::mock::MockSensors;
    use prasaran::sensors::{AttitudeFilter, AttitudeSampler, RadiationCounter, RadiationSampler};
    use std::sync::Arc;
    use std::time::Duration;

    /// Simulated sources wired into the attitude and radiation channels
    pub struct LocalSensors {
        mock: MockSensors,
        attitude: AttitudeSampler,
        radiation: RadiationSampler,
    }

    impl LocalSensors {
        pub fn start(config: &AppConfig, registry: &ChannelRegistry) -> Result<Self> {
            let (mock, streams) = MockSensors::start(&config.sensors, &config.attitude)?;
            let attitude = AttitudeSampler::spawn(
                AttitudeFilter::from_config(&config.attitude),
                streams.attitude,
                registry.get_or_create(stream::ATTITUDE),
            )?;
            let radiation = RadiationSampler::spawn(
                Arc::new(RadiationCounter::from_config(&config.radiation)),
                streams.pulses,
                Duration::from_millis(config.radiation.interval_ms),
                registry.get_or_create(stream::RADIATION),
            )?;
            Ok(Self {
                mock,
                attitude,
                radiation,
            })
        }

        pub fn stop(&mut self) {
            self.mock.stop();
            self.attitude.stop();
            self.radiation.stop();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (config, config_path) = load_config(&args)?;

    // RUST_LOG still wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("Prasaran v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => log::info!("Using config: {}", path.display()),
        None => log::info!("No config file, using built-in defaults"),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    // =========================================================================
    // Channels and datagram ingress
    // =========================================================================
    let registry = Arc::new(ChannelRegistry::with_streams(
        config.channels.queue_capacity,
        &stream::CHANNELS,
    ));
    let report = Arc::new(TextReport::new(
        config.ingress.report_banner.clone(),
        config.ingress.line_terminator.clone(),
    ));
    let ingress = Arc::new(IngressListener::new(
        config.ingress.clone(),
        registry.get_or_create(stream::DATA),
        Arc::clone(&report),
    ));
    if config.ingress.autostart {
        ingress.start()?;
    }

    // =========================================================================
    // Local sensors
    // =========================================================================
    #[cfg(feature = "mock")]
    let mut sensors = match config.sensors.source {
        SensorSourceKind::Mock => Some(local::LocalSensors::start(&config, &registry)?),
        SensorSourceKind::None => None,
    };
    #[cfg(not(feature = "mock"))]
    if config.sensors.source == SensorSourceKind::Mock {
        log::warn!("Sensor source 'mock' requested but built without the `mock` feature");
    }

    // =========================================================================
    // Viewer server (runs on the main thread until Ctrl-C)
    // =========================================================================
    let server = ViewerServer::bind(
        &config.viewer,
        Arc::clone(&registry),
        Arc::clone(&report),
        Arc::clone(&ingress),
        Arc::clone(&running),
    )?;
    log::info!("Prasaran running. Press Ctrl-C to stop.");
    server.run();

    // Shutdown
    log::info!("Shutting down...");
    if let Some(stats) = ingress.stop() {
        log::debug!("Final ingress session: {:?}", stats);
    }
    #[cfg(feature = "mock")]
    if let Some(sensors) = sensors.as_mut() {
        sensors.stop();
    }
    for name in registry.names() {
        if let Some(channel) = registry.get(&name) {
            let stats = channel.stats();
            log::info!(
                "[{}] published={} dropped={} delivered={} failures={}",
                name,
                stats.published,
                stats.dropped,
                stats.delivered,
                stats.delivery_failures
            );
        }
    }
    registry.shutdown_all();

    log::info!("Prasaran stopped");
    Ok(())
}
