use std::path::PathBuf;

use anyhow::{bail, Context};
use engine_logging::{engine_info, LogDestination, DEFAULT_LOG_FILE};
use report_app::config::DEFAULT_CONFIG_FILE;
use report_app::{AppConfig, ReportSession};
use report_core::RunStatus;
use report_engine::ReportInputs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let topic = args
        .next()
        .context("usage: report_app <topic> [config.ron]")?;
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let config = AppConfig::load_with_env(&config_path)?;
    engine_logging::initialize(
        LogDestination::Both(PathBuf::from(DEFAULT_LOG_FILE)),
        config.log_level(),
    );
    engine_info!(
        "Upstream {} (api key configured: {})",
        config.upstream.endpoint,
        config.upstream.api_key.is_some()
    );

    let mut session = ReportSession::from_config(&config);
    let outcome = session.run(&ReportInputs::new(topic)).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.bundle)?);

    if outcome.view.status == RunStatus::Error {
        bail!(
            "report run failed: {}",
            outcome.view.error.unwrap_or_default()
        );
    }
    Ok(())
}
