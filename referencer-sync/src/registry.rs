//! Live connections grouped by workspace.
//!
//! Each connection owns a bounded outbound queue drained by its writer
//! task. The registry only holds the sending halves, so dropping an entry
//! ends that connection's writer.
//!
//! Fan-out is best-effort: a peer whose queue is full or closed is logged
//! and skipped, never allowed to hold up the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use uuid::Uuid;

use crate::protocol::ServerMessage;

/// Opaque per-connection identifier.
pub type ConnectionId = Uuid;

/// Delivery statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub active_connections: usize,
    pub active_workspaces: usize,
}

/// Lock-free counters so the hot path never waits on a stats lock.
#[derive(Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

type Room = HashMap<ConnectionId, mpsc::Sender<Message>>;

/// Workspace id → connection id → outbound queue.
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<String, Room>>,
    /// Outbound queue depth per connection
    capacity: usize,
    counters: DeliveryCounters,
}

impl ConnectionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            counters: DeliveryCounters::default(),
        }
    }

    /// Register a new connection under `workspace_id`.
    ///
    /// Returns its fresh id and the receiving end of its outbound queue.
    pub async fn connect(&self, workspace_id: &str) -> (ConnectionId, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        let mut rooms = self.rooms.write().await;
        rooms.entry(workspace_id.to_string()).or_default().insert(id, tx);
        (id, rx)
    }

    /// Remove a connection; the workspace entry goes with its last one.
    ///
    /// Returns `false` if the connection was not registered.
    pub async fn disconnect(&self, workspace_id: &str, id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(workspace_id) else {
            return false;
        };
        let removed = room.remove(&id).is_some();
        if room.is_empty() {
            rooms.remove(workspace_id);
        }
        removed
    }

    /// Deliver `msg` to one connection.
    ///
    /// A connection that vanished before delivery is not an error; the call
    /// just reports `false`.
    pub async fn send_to(&self, workspace_id: &str, id: ConnectionId, msg: &ServerMessage) -> bool {
        let text = match msg.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("Failed to encode {} message: {e}", msg.kind());
                return false;
            }
        };

        let sender = {
            let rooms = self.rooms.read().await;
            rooms.get(workspace_id).and_then(|room| room.get(&id)).cloned()
        };
        let Some(sender) = sender else {
            return false;
        };

        // Awaiting outside the lock: a full queue only stalls this caller.
        match sender.send(Message::Text(text.into())).await {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Deliver `msg` to every connection of `workspace_id` except `exclude`.
    ///
    /// Returns the number of peers the message was queued for.
    pub async fn broadcast(
        &self,
        workspace_id: &str,
        msg: &ServerMessage,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let text: Utf8Bytes = match msg.encode() {
            Ok(text) => text.into(),
            Err(e) => {
                log::error!("Failed to encode {} broadcast: {e}", msg.kind());
                return 0;
            }
        };

        let recipients: Vec<(ConnectionId, mpsc::Sender<Message>)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(workspace_id) {
                Some(room) => room
                    .iter()
                    .filter(|(id, _)| Some(**id) != exclude)
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, tx) in recipients {
            match tx.try_send(Message::Text(text.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Peer {id} in workspace {workspace_id} is lagging; dropped {}", msg.kind());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Peer {id} in workspace {workspace_id} went away during broadcast");
                }
            }
        }
        self.counters.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        delivered
    }

    /// Number of live connections in a workspace.
    pub async fn connection_count(&self, workspace_id: &str) -> usize {
        self.rooms.read().await.get(workspace_id).map_or(0, HashMap::len)
    }

    pub async fn is_connected(&self, workspace_id: &str, id: ConnectionId) -> bool {
        self.rooms
            .read()
            .await
            .get(workspace_id)
            .is_some_and(|room| room.contains_key(&id))
    }

    /// Workspaces with at least one live connection.
    pub async fn active_workspaces(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let rooms = self.rooms.read().await;
        RegistryStats {
            messages_delivered: self.counters.delivered.load(Ordering::Relaxed),
            messages_dropped: self.counters.dropped.load(Ordering::Relaxed),
            active_connections: rooms.values().map(HashMap::len).sum(),
            active_workspaces: rooms.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
