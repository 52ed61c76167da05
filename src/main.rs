use std::sync::Arc;

use anyhow::Result;

use linesink::config::{self, Config};
use linesink::logging::{self, LogSink};
use linesink::server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_init(&config::config_file_path())?;

    // Create the sink BEFORE any tracing calls so nothing is lost
    let sink = Arc::new(LogSink::new(config.sink_config()?)?);
    logging::init_logging(Arc::clone(&sink), config.log.console)?;

    let log_path = sink.file_path();
    match logging::cleanup_rotated_logs(&log_path, config.log.retention_days) {
        Ok(count) if count > 0 => tracing::info!("Cleaned up {} rotated log files", count),
        Ok(_) => {}
        Err(e) => tracing::warn!("Failed to clean up rotated log files: {}", e),
    }

    tracing::info!(name = %config.name, "Logging to: {}", log_path.display());

    let server = server::start(config.api.socket_addr()?, Arc::clone(&sink)).await?;

    let signal = logging::shutdown_signal().await;
    match &signal {
        Ok(signal) => tracing::info!("Received {}, shutting down", signal),
        Err(e) => tracing::error!("Failed to listen for shutdown signals: {}", e),
    }

    server.shutdown()?;
    // The global subscriber holds a handle too, so the sink is never dropped
    sink.close();

    std::process::exit(signal?.exit_code());
}
