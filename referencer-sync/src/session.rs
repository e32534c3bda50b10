//! Per-connection control loop.
//!
//! ```text
//!  Connecting ──(snapshot sent)──▶ Streaming ──(close / fatal error)──▶ Closed
//! ```
//!
//! A session never touches the socket directly: outbound messages go
//! through the [`ConnectionRegistry`] queue that the connection's writer
//! task drains, so acks, errors and broadcasts from other sessions all
//! reach the client in queue order.

use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::action::ActionProcessor;
use crate::model::WorkspaceSnapshot;
use crate::protocol::{ClientMessage, ProtocolError, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::server::ServerStats;
use crate::storage::StoreError;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Closed,
}

/// Failures that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to load workspace: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("Store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl From<tungstenite::Error> for SessionError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Protocol(ProtocolError::Transport(e))
    }
}

/// One client attached to one workspace.
pub struct Session {
    id: ConnectionId,
    workspace_id: String,
    state: SessionState,
    registry: Arc<ConnectionRegistry>,
    processor: ActionProcessor,
    stats: Arc<RwLock<ServerStats>>,
}

impl Session {
    /// Register with the registry, make sure the workspace exists and queue
    /// its full snapshot for this connection only.
    ///
    /// Returns the session (already `Streaming`) and the outbound queue the
    /// caller's writer should drain.
    pub async fn open(
        registry: Arc<ConnectionRegistry>,
        processor: ActionProcessor,
        stats: Arc<RwLock<ServerStats>>,
        workspace_id: impl Into<String>,
    ) -> Result<(Self, mpsc::Receiver<Message>), SessionError> {
        let workspace_id = workspace_id.into();
        let (id, outbound) = registry.connect(&workspace_id).await;
        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut session = Self {
            id,
            workspace_id,
            state: SessionState::Connecting,
            registry,
            processor,
            stats,
        };

        let workspace = session.workspace_id.clone();
        let loaded = on_store(&session.processor, move |processor| load_snapshot(processor, &workspace)).await;
        let snapshot = match loaded.and_then(|r| r.map_err(SessionError::from)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::error!("Failed to load workspace {}: {e}", session.workspace_id);
                session.close().await;
                return Err(e);
            }
        };

        session
            .registry
            .send_to(&session.workspace_id, id, &ServerMessage::state(snapshot))
            .await;
        session.state = SessionState::Streaming;

        log::info!("Client {id} joined workspace {}", session.workspace_id);
        Ok((session, outbound))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process inbound frames until the peer closes or a fatal error occurs,
    /// then unregister.
    pub async fn run<S>(mut self, mut inbound: S) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let result = self.stream(&mut inbound).await;
        if let Err(e) = &result {
            log::warn!("Closing client {} in workspace {}: {e}", self.id, self.workspace_id);
        }
        self.close().await;
        result
    }

    async fn stream<S>(&mut self, inbound: &mut S) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            match frame? {
                Message::Text(text) => self.handle_text(text.as_str()).await?,
                Message::Binary(data) => {
                    let text = std::str::from_utf8(&data).map_err(|_| ProtocolError::InvalidUtf8)?;
                    self.handle_text(text).await?;
                }
                Message::Close(_) => break,
                // tungstenite answers pings on its own
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        Ok(())
    }

    /// Handle one envelope. Only a malformed envelope is an error here;
    /// action failures are reported to the client and the loop goes on.
    async fn handle_text(&mut self, text: &str) -> Result<(), SessionError> {
        let envelope = ClientMessage::decode(text)?;
        self.stats.write().await.messages_received += 1;

        let workspace = self.workspace_id.clone();
        let flattened = envelope.flattened_payload();
        let (flattened, outcome) = on_store(&self.processor, move |processor| {
            let outcome = processor.process(&workspace, &flattened);
            (flattened, outcome)
        })
        .await?;
        match outcome {
            Ok(_) => {
                self.stats.write().await.actions_applied += 1;
                self.registry
                    .send_to(
                        &self.workspace_id,
                        self.id,
                        &ServerMessage::ack(envelope.request_id.clone()),
                    )
                    .await;
                let relay = ServerMessage::action(flattened, self.id.to_string(), envelope.request_id);
                self.registry.broadcast(&self.workspace_id, &relay, Some(self.id)).await;
            }
            Err(e) => {
                log::warn!(
                    "Rejected {} from client {} in workspace {}: {e}",
                    envelope.kind,
                    self.id,
                    self.workspace_id
                );
                self.stats.write().await.actions_rejected += 1;
                self.registry
                    .send_to(
                        &self.workspace_id,
                        self.id,
                        &ServerMessage::error(e.to_string(), envelope.request_id),
                    )
                    .await;
            }
        }
        Ok(())
    }

    /// Unregister. Only the first call has any effect.
    async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.registry.disconnect(&self.workspace_id, self.id).await;
        {
            let mut s = self.stats.write().await;
            s.active_connections = s.active_connections.saturating_sub(1);
        }
        log::info!("Client {} left workspace {}", self.id, self.workspace_id);
    }
}

fn load_snapshot(processor: &ActionProcessor, workspace_id: &str) -> Result<WorkspaceSnapshot, StoreError> {
    let store = processor.store();
    if store.ensure_workspace(workspace_id)? {
        log::info!("Created workspace {workspace_id}");
    }
    store.full_state(workspace_id)
}

/// Run SQLite work on the blocking pool so a slow disk never stalls the
/// async workers serving other connections.
async fn on_store<T, F>(processor: &ActionProcessor, work: F) -> Result<T, SessionError>
where
    F: FnOnce(&ActionProcessor) -> T + Send + 'static,
    T: Send + 'static,
{
    let processor = processor.clone();
    Ok(tokio::task::spawn_blocking(move || work(&processor)).await?)
}
