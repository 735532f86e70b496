mod clock;
mod config;
mod display;
mod logger;
mod mem;
mod net;
mod payload;
mod sensor;
mod state;
mod status;
mod supervisor;
#[cfg(test)]
mod testutil;
mod watchdog;

use std::env;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clock::MonotonicClock;
use display::ConsoleDisplay;
use logger::EventLogger;
use mem::SysinfoProbe;
use net::{RumqttcBroker, SystemWifi};
use sensor::{Scenario, SimCo2Driver};
use supervisor::Supervisor;
use watchdog::SoftWatchdog;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load_or_default(&config_path)?;

    info!(
        device_id = %cfg.network.device_id,
        broker_host = %cfg.network.broker_host,
        broker_port = cfg.network.broker_port,
        "co2 monitor starting"
    );

    // ── Drivers ─────────────────────────────────────────────────────
    let scenario = Scenario::from_str_lossy(&cfg.sensor.scenario);
    info!(%scenario, "sensor backend: simulator");
    let driver = SimCo2Driver::new(scenario);

    let probe_addr = format!("{}:{}", cfg.network.broker_host, cfg.network.broker_port);
    let wifi = SystemWifi::new(
        cfg.network.wifi_ssid.as_str(),
        probe_addr,
        cfg.timing.connect_timeout(),
    );
    let broker = RumqttcBroker::new(
        cfg.network.broker_host.as_str(),
        cfg.network.broker_port,
        cfg.network.device_id.as_str(),
        cfg.timing.connect_timeout(),
        cfg.timing.publish_timeout(),
    );

    let watchdog =
        SoftWatchdog::start(cfg.timing.watchdog_timeout()).context("failed to start watchdog")?;
    let logger = EventLogger::new(&cfg.log.path, cfg.log.max_bytes);

    // ── Supervisor ──────────────────────────────────────────────────
    let mut supervisor = Supervisor::new(
        &cfg,
        MonotonicClock::new(),
        driver,
        ConsoleDisplay,
        wifi,
        broker,
        watchdog,
        SysinfoProbe::new(),
        logger,
    );

    let reason = supervisor.run().await;

    // There is no normal exit: a reboot request terminates the process
    // nonzero so the host's process supervisor restarts it, which is the
    // software half of the watchdog contract.
    error!(%reason, "rebooting");
    std::process::exit(1);
}
