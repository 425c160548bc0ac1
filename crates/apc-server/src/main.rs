//! APC daemon binary

use apc_server::{ApcServer, Config};
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let path = std::env::args_os().nth(1).map(PathBuf::from);

    // Tracing is not initialized until the config has been read
    let config = match Config::load(path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    common::logging::init_with_format(level, config.logging.format.as_deref());

    tracing::info!("APC daemon starting");

    match ApcServer::new(config).run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Exit so the supervisor restarts us with the new address
            tracing::error!(error = %e, fatal = e.is_fatal(), "APC daemon failed");
            ExitCode::FAILURE
        }
    }
}
