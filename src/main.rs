//! msgchain-rs demo - Main Entry Point
//!
//! Runs the sensor pipeline of one scenario and reads console commands until
//! `exit` or end of input.

use anyhow::Context;
use msgchain_rs::{
    app::SensorApp,
    config::{default_config_path, DemoConfig, Scenario, SCENARIO_ENV},
};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directory for daily rolling log files
const LOG_DIR_ENV: &str = "MSGCHAIN_LOG_DIR";

fn init_logging() -> Option<WorkerGuard> {
    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "msgchain-rs.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,msgchain_rs=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

fn scenario_from_env() -> Scenario {
    match std::env::var(SCENARIO_ENV) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            tracing::warn!("Ignoring {}: {}", SCENARIO_ENV, e);
            Scenario::default()
        }),
        Err(_) => Scenario::default(),
    }
}

fn load_config() -> DemoConfig {
    let fallback = scenario_from_env();

    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        tracing::info!("Loading config from {:?}", path);
        return DemoConfig::load_or_preset(path, fallback);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::info!("Loading config from {:?}", path);
            DemoConfig::load_or_preset(path, fallback)
        }
        _ => DemoConfig::preset(fallback),
    }
}

fn run() -> anyhow::Result<()> {
    tracing::info!(
        "Starting msgchain-rs demo at {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let config = load_config();
    let mut app = SensorApp::launch(&config).context("Failed to start sensor pipeline")?;

    let console = app.run_console(std::io::stdin().lock(), std::io::stdout());

    tracing::info!("Shutting down...");
    let report = app.shutdown();
    tracing::info!(
        "Stopped: {} workers completed, {} failed, {} panicked",
        report.workers_completed,
        report.workers_failed,
        report.workers_panicked
    );

    console.context("Console input failed")?;
    Ok(())
}

fn main() {
    let _guard = init_logging();

    if let Err(e) = run() {
        tracing::error!("{:#}", e);
    }
}
