//! Referencer sync server.
//!
//! Serves `/ws/{workspaceId}` WebSocket connections backed by a SQLite
//! workspace store. Configured through `REFERENCER_BIND_ADDR`,
//! `REFERENCER_DB_PATH` and `REFERENCER_OUTBOUND_CAPACITY`; log filtering
//! through `RUST_LOG` (default `info`).

use log::{error, info};
use std::process::ExitCode;

use referencer_sync::{ServerConfig, ServerError, SyncServer};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Referencer sync server...");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;
    match &config.storage_path {
        Some(path) => info!("Workspace store: {}", path.display()),
        None => info!("Workspace store: in-memory (set REFERENCER_DB_PATH to persist)"),
    }
    let server = SyncServer::new(config)?;
    server.run().await
}
