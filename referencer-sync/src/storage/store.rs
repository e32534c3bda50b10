//! SQLite-backed workspace store.
//!
//! A single connection sits behind a mutex, so every operation is
//! serialized; each mutating call runs in its own transaction and either
//! commits fully or rolls back on drop.

use rusqlite::{params, Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use super::{schema, snapshot};
use crate::model::{Arrow, Highlight, Underline, WorkspaceSnapshot, DEFAULT_EDITOR_NAME};

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file path
    pub path: PathBuf,
    /// How long a statement waits on a locked database file
    pub busy_timeout: Duration,
    /// Use write-ahead journaling (file-backed stores only)
    pub wal_journal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/referencer.db"),
            busy_timeout: Duration::from_secs(5),
            wal_journal: true,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Schema upgrade to version {version} failed: {source}")]
    Migration {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },
    #[error("Layer {layer_id} not found in workspace {workspace_id}")]
    LayerNotFound {
        workspace_id: String,
        layer_id: String,
    },
    #[error("Editor index {index} out of range (next index is {expected})")]
    EditorIndexOutOfRange { index: i64, expected: i64 },
    #[error("Failed to generate unique share code after {attempts} attempts")]
    ShareCodeExhausted { attempts: usize },
    #[error("Unknown access level: {0}")]
    UnknownAccess(String),
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Durable workspace store.
pub struct WorkspaceStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl WorkspaceStore {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(config.busy_timeout)?;
        if config.wal_journal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            log::debug!("Journal mode: {mode}");
        }

        log::info!("Opened workspace store at {}", config.path.display());
        Self::init(conn, Some(config.path))
    }

    /// Volatile store for tests and ephemeral servers.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        schema::current_version(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run `f` against the connection without opening a transaction.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` in a transaction, committing only if it succeeds.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // --- Workspaces ---

    /// Create the workspace with its default editor if it does not exist.
    ///
    /// Returns `true` when the workspace was created by this call.
    pub fn ensure_workspace(&self, workspace_id: &str) -> Result<bool, StoreError> {
        self.write(|tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO workspace (id) VALUES (?1)",
                [workspace_id],
            )?;
            if inserted == 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO editor (workspace_id, index_pos, name, visible) VALUES (?1, 0, ?2, 1)",
                params![workspace_id, DEFAULT_EDITOR_NAME],
            )?;
            Ok(true)
        })
    }

    pub fn workspace_exists(&self, workspace_id: &str) -> Result<bool, StoreError> {
        self.read(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM workspace WHERE id = ?1",
                [workspace_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Assemble the full workspace snapshot.
    pub fn full_state(&self, workspace_id: &str) -> Result<WorkspaceSnapshot, StoreError> {
        self.read(|conn| snapshot::assemble(conn, workspace_id))
    }

    // --- Layers ---

    /// Append a layer after the current last position.
    pub fn add_layer(
        &self,
        workspace_id: &str,
        layer_id: &str,
        name: &str,
        color: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            let position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position), -1) + 1 FROM layer WHERE workspace_id = ?1",
                [workspace_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO layer (id, workspace_id, name, color, visible, position)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![layer_id, workspace_id, name, color, position],
            )?;
            Ok(())
        })
    }

    /// Delete a layer; its highlights, arrows and underlines cascade.
    pub fn remove_layer(&self, workspace_id: &str, layer_id: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM layer WHERE id = ?1 AND workspace_id = ?2",
                params![layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    pub fn update_layer_name(
        &self,
        workspace_id: &str,
        layer_id: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE layer SET name = ?1 WHERE id = ?2 AND workspace_id = ?3",
                params![name, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    pub fn update_layer_color(
        &self,
        workspace_id: &str,
        layer_id: &str,
        color: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE layer SET color = ?1 WHERE id = ?2 AND workspace_id = ?3",
                params![color, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    pub fn toggle_layer_visibility(
        &self,
        workspace_id: &str,
        layer_id: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE layer SET visible = NOT visible WHERE id = ?1 AND workspace_id = ?2",
                params![layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    /// Rewrite layer positions to match the order of `layer_ids`.
    pub fn reorder_layers(&self, workspace_id: &str, layer_ids: &[String]) -> Result<(), StoreError> {
        self.write(|tx| {
            let mut stmt =
                tx.prepare("UPDATE layer SET position = ?1 WHERE id = ?2 AND workspace_id = ?3")?;
            for (position, layer_id) in layer_ids.iter().enumerate() {
                stmt.execute(params![position as i64, layer_id, workspace_id])?;
            }
            Ok(())
        })
    }

    // --- Highlights ---

    pub fn add_highlight(
        &self,
        workspace_id: &str,
        layer_id: &str,
        highlight: &Highlight,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            require_layer(tx, workspace_id, layer_id)?;
            tx.execute(
                "INSERT INTO highlight (id, layer_id, editor_index, start_pos, end_pos, text, annotation)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    highlight.id,
                    layer_id,
                    highlight.editor_index,
                    highlight.start,
                    highlight.end,
                    highlight.text,
                    highlight.annotation,
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove_highlight(
        &self,
        workspace_id: &str,
        layer_id: &str,
        highlight_id: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM highlight WHERE id = ?1 AND layer_id = ?2
                   AND layer_id IN (SELECT id FROM layer WHERE workspace_id = ?3)",
                params![highlight_id, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    pub fn update_highlight_annotation(
        &self,
        workspace_id: &str,
        layer_id: &str,
        highlight_id: &str,
        annotation: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE highlight SET annotation = ?1 WHERE id = ?2 AND layer_id = ?3
                   AND layer_id IN (SELECT id FROM layer WHERE workspace_id = ?4)",
                params![annotation, highlight_id, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    // --- Arrows ---

    pub fn add_arrow(&self, workspace_id: &str, layer_id: &str, arrow: &Arrow) -> Result<(), StoreError> {
        self.write(|tx| {
            require_layer(tx, workspace_id, layer_id)?;
            let (from, to) = (&arrow.source, &arrow.target);
            tx.execute(
                "INSERT INTO arrow (id, layer_id,
                                    from_editor_index, from_start, from_end, from_text,
                                    to_editor_index, to_start, to_end, to_text, arrow_style)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    arrow.id,
                    layer_id,
                    from.editor_index,
                    from.start,
                    from.end,
                    from.text,
                    to.editor_index,
                    to.start,
                    to.end,
                    to.text,
                    arrow.arrow_style,
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove_arrow(&self, workspace_id: &str, layer_id: &str, arrow_id: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM arrow WHERE id = ?1 AND layer_id = ?2
                   AND layer_id IN (SELECT id FROM layer WHERE workspace_id = ?3)",
                params![arrow_id, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    pub fn update_arrow_style(
        &self,
        workspace_id: &str,
        layer_id: &str,
        arrow_id: &str,
        arrow_style: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE arrow SET arrow_style = ?1 WHERE id = ?2 AND layer_id = ?3
                   AND layer_id IN (SELECT id FROM layer WHERE workspace_id = ?4)",
                params![arrow_style, arrow_id, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    // --- Underlines ---

    pub fn add_underline(
        &self,
        workspace_id: &str,
        layer_id: &str,
        underline: &Underline,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            require_layer(tx, workspace_id, layer_id)?;
            tx.execute(
                "INSERT INTO underline (id, layer_id, editor_index, start_pos, end_pos, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    underline.id,
                    layer_id,
                    underline.editor_index,
                    underline.start,
                    underline.end,
                    underline.text,
                ],
            )?;
            Ok(())
        })
    }

    pub fn remove_underline(
        &self,
        workspace_id: &str,
        layer_id: &str,
        underline_id: &str,
    ) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM underline WHERE id = ?1 AND layer_id = ?2
                   AND layer_id IN (SELECT id FROM layer WHERE workspace_id = ?3)",
                params![underline_id, layer_id, workspace_id],
            )?;
            Ok(())
        })
    }

    // --- Editors ---

    /// Append an editor. `index` must equal the current editor count so the
    /// indices stay contiguous.
    pub fn add_editor(&self, workspace_id: &str, index: i64, name: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM editor WHERE workspace_id = ?1",
                [workspace_id],
                |row| row.get(0),
            )?;
            if index != count {
                return Err(StoreError::EditorIndexOutOfRange { index, expected: count });
            }
            tx.execute(
                "INSERT INTO editor (workspace_id, index_pos, name, visible) VALUES (?1, ?2, ?3, 1)",
                params![workspace_id, index, name],
            )?;
            Ok(())
        })
    }

    /// Delete the editor at `index` and close the gap so indices stay 0..N-1.
    pub fn remove_editor(&self, workspace_id: &str, index: i64) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "DELETE FROM editor WHERE workspace_id = ?1 AND index_pos = ?2",
                params![workspace_id, index],
            )?;

            // Ascending order never collides with a not-yet-moved row.
            let ids = editor_row_ids(tx, workspace_id)?;
            let mut stmt = tx.prepare("UPDATE editor SET index_pos = ?1 WHERE id = ?2")?;
            for (new_index, id) in ids.iter().enumerate() {
                stmt.execute(params![new_index as i64, id])?;
            }
            Ok(())
        })
    }

    pub fn update_section_name(&self, workspace_id: &str, index: i64, name: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE editor SET name = ?1 WHERE workspace_id = ?2 AND index_pos = ?3",
                params![name, workspace_id, index],
            )?;
            Ok(())
        })
    }

    pub fn toggle_section_visibility(&self, workspace_id: &str, index: i64) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute(
                "UPDATE editor SET visible = NOT visible WHERE workspace_id = ?1 AND index_pos = ?2",
                params![workspace_id, index],
            )?;
            Ok(())
        })
    }

    /// Move the editor currently at `permutation[i]` to index `i`.
    ///
    /// Unknown source indices are skipped. Editors not named in the
    /// permutation are appended after it in their previous order, so the
    /// indices stay contiguous.
    pub fn reorder_editors(&self, workspace_id: &str, permutation: &[i64]) -> Result<(), StoreError> {
        self.write(|tx| {
            let mut rows = {
                let mut stmt = tx.prepare(
                    "SELECT id, index_pos FROM editor WHERE workspace_id = ?1 ORDER BY index_pos",
                )?;
                let rows = stmt
                    .query_map([workspace_id], |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let mut order = Vec::with_capacity(rows.len());
            for old_index in permutation {
                if let Some(pos) = rows.iter().position(|(_, idx)| idx == old_index) {
                    order.push(rows.remove(pos).0);
                }
            }
            order.extend(rows.into_iter().map(|(id, _)| id));

            // Park every row on a negative index first so the unique index
            // never sees two rows on the same slot mid-update.
            tx.execute(
                "UPDATE editor SET index_pos = -1 - index_pos WHERE workspace_id = ?1",
                [workspace_id],
            )?;
            let mut stmt = tx.prepare("UPDATE editor SET index_pos = ?1 WHERE id = ?2")?;
            for (new_index, id) in order.iter().enumerate() {
                stmt.execute(params![new_index as i64, id])?;
            }
            Ok(())
        })
    }

    pub fn update_editor_content(
        &self,
        workspace_id: &str,
        index: i64,
        content: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(content)?;
        self.write(|tx| {
            tx.execute(
                "UPDATE editor SET content_json = ?1 WHERE workspace_id = ?2 AND index_pos = ?3",
                params![encoded, workspace_id, index],
            )?;
            Ok(())
        })
    }
}

fn require_layer(tx: &Transaction<'_>, workspace_id: &str, layer_id: &str) -> Result<(), StoreError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM layer WHERE id = ?1 AND workspace_id = ?2",
        params![layer_id, workspace_id],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(StoreError::LayerNotFound {
            workspace_id: workspace_id.to_string(),
            layer_id: layer_id.to_string(),
        });
    }
    Ok(())
}

fn editor_row_ids(tx: &Transaction<'_>, workspace_id: &str) -> Result<Vec<i64>, StoreError> {
    let mut stmt = tx.prepare("SELECT id FROM editor WHERE workspace_id = ?1 ORDER BY index_pos")?;
    let ids = stmt
        .query_map([workspace_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Endpoint;
    use serde_json::json;

    fn store_with(workspace_id: &str) -> WorkspaceStore {
        let store = WorkspaceStore::open_in_memory().unwrap();
        store.ensure_workspace(workspace_id).unwrap();
        store
    }

    fn highlight(id: &str, start: i64, end: i64) -> Highlight {
        Highlight {
            id: id.into(),
            editor_index: 0,
            start,
            end,
            text: "text".into(),
            annotation: String::new(),
        }
    }

    fn editor_names(store: &WorkspaceStore, ws: &str) -> Vec<(i64, String)> {
        store
            .full_state(ws)
            .unwrap()
            .editors
            .into_iter()
            .map(|e| (e.index, e.name))
            .collect()
    }

    #[test]
    fn test_ensure_workspace_seeds_once() {
        let store = WorkspaceStore::open_in_memory().unwrap();
        assert!(store.ensure_workspace("ws").unwrap());
        assert!(!store.ensure_workspace("ws").unwrap());

        let state = store.full_state("ws").unwrap();
        assert_eq!(state.editors.len(), 1);
        assert_eq!(state.editors[0].index, 0);
        assert_eq!(state.editors[0].name, DEFAULT_EDITOR_NAME);
        assert!(state.editors[0].visible);
        assert!(state.editors[0].content.is_none());
    }

    #[test]
    fn test_workspace_exists() {
        let store = WorkspaceStore::open_in_memory().unwrap();
        assert!(!store.workspace_exists("ws").unwrap());
        store.ensure_workspace("ws").unwrap();
        assert!(store.workspace_exists("ws").unwrap());
    }

    #[test]
    fn test_add_layer_appends_position() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "First", "#f00").unwrap();
        store.add_layer("ws", "b", "Second", "#0f0").unwrap();
        store.add_layer("ws", "c", "Third", "#00f").unwrap();

        let ids: Vec<String> = store.full_state("ws").unwrap().layers.into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_add_layer_unknown_workspace_fails() {
        let store = WorkspaceStore::open_in_memory().unwrap();
        assert!(store.add_layer("missing", "a", "A", "#000").is_err());
    }

    #[test]
    fn test_duplicate_layer_id_rejected() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "A", "#000").unwrap();
        let err = store.add_layer("ws", "a", "Again", "#111").unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(store.full_state("ws").unwrap().layers.len(), 1);
    }

    #[test]
    fn test_layer_field_updates() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "A", "#000").unwrap();
        store.update_layer_name("ws", "a", "Renamed").unwrap();
        store.update_layer_color("ws", "a", "#abc").unwrap();
        store.toggle_layer_visibility("ws", "a").unwrap();

        let state = store.full_state("ws").unwrap();
        let layer = state.layer("a").unwrap();
        assert_eq!(layer.name, "Renamed");
        assert_eq!(layer.color, "#abc");
        assert!(!layer.visible);

        store.toggle_layer_visibility("ws", "a").unwrap();
        assert!(store.full_state("ws").unwrap().layer("a").unwrap().visible);
    }

    #[test]
    fn test_layer_updates_scoped_to_workspace() {
        let store = store_with("ws-1");
        store.ensure_workspace("ws-2").unwrap();
        store.add_layer("ws-1", "a", "A", "#000").unwrap();

        store.update_layer_name("ws-2", "a", "Hijacked").unwrap();
        store.remove_layer("ws-2", "a").unwrap();

        let state = store.full_state("ws-1").unwrap();
        assert_eq!(state.layer("a").unwrap().name, "A");
    }

    #[test]
    fn test_reorder_layers() {
        let store = store_with("ws");
        for id in ["a", "b", "c"] {
            store.add_layer("ws", id, id, "#000").unwrap();
        }
        store
            .reorder_layers("ws", &["c".to_string(), "a".to_string(), "b".to_string()])
            .unwrap();

        let ids: Vec<String> = store.full_state("ws").unwrap().layers.into_iter().map(|l| l.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_remove_layer_cascades() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "A", "#000").unwrap();
        store.add_highlight("ws", "a", &highlight("h1", 0, 4)).unwrap();

        store.remove_layer("ws", "a").unwrap();
        assert!(store.full_state("ws").unwrap().layers.is_empty());

        let orphans: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM highlight", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_highlight_lifecycle() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "A", "#000").unwrap();
        store.add_highlight("ws", "a", &highlight("h1", 2, 8)).unwrap();
        store.update_highlight_annotation("ws", "a", "h1", "note").unwrap();

        let state = store.full_state("ws").unwrap();
        let h = &state.layer("a").unwrap().highlights[0];
        assert_eq!((h.start, h.end), (2, 8));
        assert_eq!(h.annotation, "note");

        store.remove_highlight("ws", "a", "h1").unwrap();
        assert!(store.full_state("ws").unwrap().layer("a").unwrap().highlights.is_empty());
    }

    #[test]
    fn test_highlight_into_foreign_layer_rejected() {
        let store = store_with("ws-1");
        store.ensure_workspace("ws-2").unwrap();
        store.add_layer("ws-1", "a", "A", "#000").unwrap();

        let err = store.add_highlight("ws-2", "a", &highlight("h1", 0, 1)).unwrap_err();
        assert!(matches!(err, StoreError::LayerNotFound { .. }));
    }

    #[test]
    fn test_arrow_lifecycle() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "A", "#000").unwrap();
        let arrow = Arrow {
            id: "x".into(),
            source: Endpoint { editor_index: 0, start: 1, end: 3, text: "in".into() },
            target: Endpoint { editor_index: 0, start: 10, end: 14, text: "word".into() },
            arrow_style: "solid".into(),
        };
        store.add_arrow("ws", "a", &arrow).unwrap();
        store.update_arrow_style("ws", "a", "x", "dashed").unwrap();

        let state = store.full_state("ws").unwrap();
        let stored = &state.layer("a").unwrap().arrows[0];
        assert_eq!(stored.source, arrow.source);
        assert_eq!(stored.target.text, "word");
        assert_eq!(stored.arrow_style, "dashed");

        store.remove_arrow("ws", "a", "x").unwrap();
        assert!(store.full_state("ws").unwrap().layer("a").unwrap().arrows.is_empty());
    }

    #[test]
    fn test_underline_lifecycle() {
        let store = store_with("ws");
        store.add_layer("ws", "a", "A", "#000").unwrap();
        let underline = Underline { id: "u".into(), editor_index: 0, start: 0, end: 5, text: "Hello".into() };
        store.add_underline("ws", "a", &underline).unwrap();
        assert_eq!(store.full_state("ws").unwrap().layer("a").unwrap().underlines, vec![underline]);

        store.remove_underline("ws", "a", "u").unwrap();
        assert!(store.full_state("ws").unwrap().layer("a").unwrap().underlines.is_empty());
    }

    #[test]
    fn test_remove_editor_reindexes() {
        let store = store_with("ws");
        store.add_editor("ws", 1, "Passage 2").unwrap();
        store.add_editor("ws", 2, "Passage 3").unwrap();
        store.update_editor_content("ws", 2, &json!({"type": "doc"})).unwrap();

        store.remove_editor("ws", 0).unwrap();

        let state = store.full_state("ws").unwrap();
        assert_eq!(
            state.editors.iter().map(|e| (e.index, e.name.as_str())).collect::<Vec<_>>(),
            vec![(0, "Passage 2"), (1, "Passage 3")]
        );
        assert_eq!(state.editors[1].content, Some(json!({"type": "doc"})));
    }

    #[test]
    fn test_remove_middle_editor() {
        let store = store_with("ws");
        store.add_editor("ws", 1, "B").unwrap();
        store.add_editor("ws", 2, "C").unwrap();
        store.remove_editor("ws", 1).unwrap();
        assert_eq!(editor_names(&store, "ws"), vec![(0, "Passage 1".to_string()), (1, "C".to_string())]);
    }

    #[test]
    fn test_add_editor_occupied_index_fails() {
        let store = store_with("ws");
        let err = store.add_editor("ws", 0, "Clash").unwrap_err();
        assert!(matches!(err, StoreError::EditorIndexOutOfRange { index: 0, expected: 1 }));
        assert_eq!(store.full_state("ws").unwrap().editors.len(), 1);
    }

    #[test]
    fn test_add_editor_rejects_gaps_and_negatives() {
        let store = store_with("ws");
        for index in [5, -3, 2] {
            let err = store.add_editor("ws", index, "Stray").unwrap_err();
            assert!(matches!(err, StoreError::EditorIndexOutOfRange { expected: 1, .. }));
        }
        store.add_editor("ws", 1, "Passage 2").unwrap();

        let indices: Vec<i64> = store.full_state("ws").unwrap().editors.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_section_updates() {
        let store = store_with("ws");
        store.update_section_name("ws", 0, "Genesis 1").unwrap();
        store.toggle_section_visibility("ws", 0).unwrap();

        let editor = &store.full_state("ws").unwrap().editors[0];
        assert_eq!(editor.name, "Genesis 1");
        assert!(!editor.visible);
    }

    #[test]
    fn test_reorder_editors() {
        let store = store_with("ws");
        store.add_editor("ws", 1, "B").unwrap();
        store.add_editor("ws", 2, "C").unwrap();

        store.reorder_editors("ws", &[2, 0, 1]).unwrap();
        assert_eq!(
            editor_names(&store, "ws"),
            vec![(0, "C".to_string()), (1, "Passage 1".to_string()), (2, "B".to_string())]
        );
    }

    #[test]
    fn test_reorder_editors_partial_permutation() {
        let store = store_with("ws");
        store.add_editor("ws", 1, "B").unwrap();
        store.add_editor("ws", 2, "C").unwrap();

        store.reorder_editors("ws", &[1, 9]).unwrap();
        assert_eq!(
            editor_names(&store, "ws"),
            vec![(0, "B".to_string()), (1, "Passage 1".to_string()), (2, "C".to_string())]
        );
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let store = store_with("ws");
        let result: Result<(), StoreError> = store.write(|tx| {
            tx.execute("INSERT INTO layer (id, workspace_id, name, color) VALUES ('a', 'ws', 'A', '#0')", [])?;
            tx.execute("INSERT INTO layer (id, workspace_id, name, color) VALUES ('a', 'ws', 'A', '#0')", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert!(store.full_state("ws").unwrap().layers.is_empty());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::ShareCodeExhausted { attempts: 5 };
        assert_eq!(err.to_string(), "Failed to generate unique share code after 5 attempts");
        assert_eq!(StoreError::LockPoisoned.to_string(), "Store lock poisoned");
    }
}
