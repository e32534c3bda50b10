//! Persistent storage for workspaces.
//!
//! ```text
//! ┌──────────────┐   one transaction    ┌────────────────────────────┐
//! │ ActionProc.  │ ───── per action ──► │ WorkspaceStore (SQLite)    │
//! └──────────────┘                      │  workspace / editor        │
//!                                       │  layer ─┬─ highlight       │
//! ┌──────────────┐   fixed query count  │         ├─ arrow           │
//! │ Session      │ ◄──── snapshot ───── │         └─ underline       │
//! └──────────────┘                      │  share_link                │
//!                                       │  schema_version            │
//!                                       └────────────────────────────┘
//! ```
//!
//! The schema is brought up to date by numbered upgrade scripts when the
//! store opens (see [`schema`]).

pub mod schema;
pub mod share;
mod snapshot;
mod store;

pub use share::{generate_code, SHARE_CODE_ATTEMPTS, SHARE_CODE_LEN};
pub use store::{StoreConfig, StoreError, WorkspaceStore};
