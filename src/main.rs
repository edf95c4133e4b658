use bcibridge::config::BridgeConfig;
use bcibridge::factory;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = BridgeConfig::load(config_path.as_deref())
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    setup_logging_env(config.level()?);

    let pipeline = factory::build_pipeline(&config)?;
    pipeline.set_error_hook(|fault| warn!("Pipeline fault: {}", fault));

    pipeline.start()?;
    info!("Pipeline running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;

    info!("Shutting down");
    pipeline.stop()?;

    let stats = pipeline.statistics();
    info!("Final statistics: {}", serde_json::to_string(&stats)?);
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

// RUST_LOG wins over the configured level when it names a plain level.
fn setup_logging_env(configured: Level) {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(value.trim()).ok())
        .unwrap_or(configured);

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
