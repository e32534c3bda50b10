//! WebSocket sync server with workspace-based routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐                         ┌── ActionProcessor ── WorkspaceStore (SQLite)
//!             ├── /ws/{workspaceId} ── Session
//! Client B ──┘                         └── ConnectionRegistry
//!                                               │
//!                                    ┌──────────┼───────────┐
//!                                    ▼          ▼           ▼
//!                                 Client A   Client B    Client C
//! ```
//!
//! Each accepted socket gets two tasks: the session loop reading frames
//! and a writer draining the connection's outbound queue into the sink.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use crate::action::ActionProcessor;
use crate::protocol::{workspace_id_from_path, ProtocolError};
use crate::registry::ConnectionRegistry;
use crate::session::{Session, SessionError};
use crate::storage::{StoreConfig, StoreError, WorkspaceStore};

/// Environment variable overriding [`ServerConfig::bind_addr`].
pub const ENV_BIND_ADDR: &str = "REFERENCER_BIND_ADDR";
/// Environment variable overriding [`ServerConfig::storage_path`].
pub const ENV_DB_PATH: &str = "REFERENCER_DB_PATH";
/// Environment variable overriding [`ServerConfig::outbound_capacity`].
pub const ENV_OUTBOUND_CAPACITY: &str = "REFERENCER_OUTBOUND_CAPACITY";

/// Pause after a failed accept (e.g. out of file descriptors) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// SQLite database file (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Outbound queue depth per connection
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            storage_path: None,
            outbound_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with the `REFERENCER_*` environment variables.
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            if addr.trim().is_empty() {
                return Err(ServerError::Config {
                    var: ENV_BIND_ADDR,
                    value: addr,
                });
            }
            config.bind_addr = addr;
        }

        if let Some(path) = lookup(ENV_DB_PATH) {
            config.storage_path = (!path.is_empty()).then(|| PathBuf::from(path));
        }

        if let Some(raw) = lookup(ENV_OUTBOUND_CAPACITY) {
            config.outbound_capacity = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ServerError::Config {
                        var: ENV_OUTBOUND_CAPACITY,
                        value: raw,
                    })
                }
            };
        }

        Ok(config)
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub messages_received: u64,
    pub actions_applied: u64,
    pub actions_rejected: u64,
}

/// Startup and per-connection failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Invalid value for {var}: {value:?}")]
    Config { var: &'static str, value: String },
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    store: Arc<WorkspaceStore>,
    registry: Arc<ConnectionRegistry>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a server, opening the configured store.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store = match &config.storage_path {
            Some(path) => WorkspaceStore::open(StoreConfig::at(path))?,
            None => WorkspaceStore::open_in_memory()?,
        };
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Create with default configuration (in-memory store).
    pub fn with_defaults() -> Result<Self, ServerError> {
        Self::new(ServerConfig::default())
    }

    /// Create around an already opened store.
    pub fn with_store(config: ServerConfig, store: Arc<WorkspaceStore>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.outbound_capacity));
        Self {
            config,
            store,
            registry,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Bind to the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Sync server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Accept loop on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let processor = ActionProcessor::new(self.store.clone());
        loop {
            let Some((stream, addr)) = accepted(listener.accept().await).await else {
                continue;
            };
            log::debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let processor = processor.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, processor, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<ConnectionRegistry>,
        processor: ActionProcessor,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), ServerError> {
        let mut workspace_id = None;
        let route = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            match workspace_id_from_path(req.uri().path()) {
                Some(id) => {
                    workspace_id = Some(id.to_string());
                    Ok(resp)
                }
                None => {
                    let mut reject = ErrorResponse::new(Some("expected /ws/{workspaceId}".to_string()));
                    *reject.status_mut() = StatusCode::BAD_REQUEST;
                    Err(reject)
                }
            }
        };

        let ws_stream = tokio_tungstenite::accept_hdr_async(stream, route)
            .await
            .map_err(ProtocolError::from)?;
        let Some(workspace_id) = workspace_id else {
            return Ok(());
        };
        log::info!("WebSocket connection established from {addr} for workspace {workspace_id}");

        let (mut ws_sender, ws_receiver) = ws_stream.split();
        let (session, mut outbound) = Session::open(registry, processor, stats, workspace_id).await?;

        // Ends once the registry drops this connection's sender.
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    log::debug!("Write to {addr} failed: {e}");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        let result = session.run(ws_receiver).await;
        if let Err(e) = writer.await {
            log::error!("Writer task for {addr} panicked: {e}");
        }
        log::info!("Connection closed from {addr}");
        result.map_err(ServerError::from)
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }
}

/// A failed accept only affects that connection attempt; the loop keeps going.
async fn accepted<T>(result: std::io::Result<T>) -> Option<T> {
    match result {
        Ok(conn) => Some(conn),
        Err(e) => {
            log::error!("Failed to accept connection: {e}");
            tokio::time::sleep(ACCEPT_BACKOFF).await;
            None
        }
    }
}
