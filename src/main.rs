//! # WiFi Bridge
//!
//! Runs the co-processor end of the serial link on a Linux host.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (path from the first argument)
//!    - Set up logging with tracing subscriber, optionally to a file
//!    - Open the serial port and start the ready-line watcher
//!
//! 2. **Main Loop**
//!    - Let the UDP relay pick up received datagrams
//!    - Poll the link once per tick
//!    - Handle Ctrl+C for graceful shutdown

use std::time::Instant;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wifi_bridge::config::Config;
use wifi_bridge::host;
use wifi_bridge::link::stats::Stage;
use wifi_bridge::link::Link;
use wifi_bridge::serial::{LinkSerial, DEFAULT_DEVICE_PATHS};

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Set up logging; the guard must live as long as file logging is wanted
fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if config.logging.dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::never(&config.logging.dir, &config.logging.file);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path).with_context(|| format!("Failed to load {}", config_path))?;

    let _log_guard = init_logging(&config);
    info!("WiFi Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut paths = vec![config.serial.port.as_str()];
    paths.extend(DEFAULT_DEVICE_PATHS.iter().filter(|p| **p != config.serial.port));
    let serial = LinkSerial::open_with_paths(&paths, config.serial.baud_rate)?;
    info!("Link serial port opened at: {}", serial.device_path());

    let collab = host::collaborators(config.bind_addr()?);
    let mut link = Link::new(serial, collab, config.timings(), Instant::now());

    let watcher = link
        .port()
        .spawn_ready_watcher(link.ready_line(), Duration::from_micros(config.serial.ready_line_poll_us))?;

    let mut ticker = interval(Duration::from_micros(config.serial.poll_interval_us));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Polling link every {}us", config.serial.poll_interval_us);
    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = Instant::now();
                link.collaborators_mut().udp.process();
                link.stats_mut().record_time(Stage::Wifi, started.elapsed());

                link.poll(Instant::now());
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Communication errors: {}", link.stats().comm_errors());
                break;
            }
        }
    }

    watcher.abort();
    Ok(())
}
