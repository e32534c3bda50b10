//! # referencer-sync: Real-time workspace sync for Referencer
//!
//! Keeps every browser attached to a workspace looking at the same layers,
//! highlights, arrows and passage editors. Clients send named actions; the
//! server validates and persists each one, acknowledges the sender and
//! relays the action to everyone else in the workspace.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │  Browser    │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     JSON frames     │ /ws/{id}    │
//! └─────────────┘                     └──────┬──────┘
//!                                            │ one Session per socket
//!                              ┌─────────────┴─────────────┐
//!                              ▼                           ▼
//!                     ┌─────────────────┐        ┌──────────────────┐
//!                     │ ActionProcessor │        │ConnectionRegistry│
//!                     │ (enum dispatch) │        │ (fan-out)        │
//!                     └────────┬────────┘        └──────────────────┘
//!                              ▼
//!                     ┌─────────────────┐
//!                     │ WorkspaceStore  │
//!                     │ (SQLite)        │
//!                     └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`]: Workspace snapshot types
//! - [`storage`]: SQLite persistence, snapshot assembly, share links
//! - [`action`]: Closed set of mutations and their dispatch
//! - [`protocol`]: JSON wire messages
//! - [`registry`]: Live connections per workspace
//! - [`session`]: Per-connection control loop
//! - [`server`]: WebSocket accept loop and configuration

pub mod action;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use action::{Action, ActionError, ActionKind, ActionProcessor};
pub use model::{
    Access, Arrow, Editor, Endpoint, Highlight, Layer, ShareLink, Underline, WorkspaceSnapshot,
};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryStats};
pub use server::{ServerConfig, ServerError, ServerStats, SyncServer};
pub use session::{Session, SessionError, SessionState};
pub use storage::{StoreConfig, StoreError, WorkspaceStore};
