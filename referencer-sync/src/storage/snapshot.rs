//! Workspace snapshot assembly.
//!
//! A fixed number of queries regardless of workspace size: layers, then
//! every highlight, arrow and underline of the workspace in one bulk query
//! each (grouped by layer in memory), then editors.

use rusqlite::Connection;
use std::collections::HashMap;

use super::StoreError;
use crate::model::{Arrow, Editor, Endpoint, Highlight, Layer, Underline, WorkspaceSnapshot};

/// Build the complete snapshot for `workspace_id`.
///
/// Layers come back ascending by position, editors ascending by index.
/// Children keep insertion order within their layer.
pub(crate) fn assemble(conn: &Connection, workspace_id: &str) -> Result<WorkspaceSnapshot, StoreError> {
    let mut layers = load_layers(conn, workspace_id)?;

    if !layers.is_empty() {
        let mut highlights = load_highlights(conn, workspace_id)?;
        let mut arrows = load_arrows(conn, workspace_id)?;
        let mut underlines = load_underlines(conn, workspace_id)?;

        for layer in &mut layers {
            layer.highlights = highlights.remove(&layer.id).unwrap_or_default();
            layer.arrows = arrows.remove(&layer.id).unwrap_or_default();
            layer.underlines = underlines.remove(&layer.id).unwrap_or_default();
        }
    }

    let editors = load_editors(conn, workspace_id)?;

    Ok(WorkspaceSnapshot {
        workspace_id: workspace_id.to_string(),
        layers,
        editors,
    })
}

fn load_layers(conn: &Connection, workspace_id: &str) -> Result<Vec<Layer>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, color, visible FROM layer
         WHERE workspace_id = ?1
         ORDER BY position, rowid",
    )?;
    let layers = stmt
        .query_map([workspace_id], |row| {
            Ok(Layer {
                id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                visible: row.get(3)?,
                highlights: Vec::new(),
                arrows: Vec::new(),
                underlines: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layers)
}

fn load_highlights(
    conn: &Connection,
    workspace_id: &str,
) -> Result<HashMap<String, Vec<Highlight>>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT h.layer_id, h.id, h.editor_index, h.start_pos, h.end_pos, h.text, h.annotation
         FROM highlight h
         JOIN layer l ON h.layer_id = l.id
         WHERE l.workspace_id = ?1
         ORDER BY h.rowid",
    )?;
    let mut rows = stmt.query([workspace_id])?;

    let mut by_layer: HashMap<String, Vec<Highlight>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let layer_id: String = row.get(0)?;
        by_layer.entry(layer_id).or_default().push(Highlight {
            id: row.get(1)?,
            editor_index: row.get(2)?,
            start: row.get(3)?,
            end: row.get(4)?,
            text: row.get(5)?,
            annotation: row.get(6)?,
        });
    }
    Ok(by_layer)
}

fn load_arrows(conn: &Connection, workspace_id: &str) -> Result<HashMap<String, Vec<Arrow>>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT a.layer_id, a.id,
                a.from_editor_index, a.from_start, a.from_end, a.from_text,
                a.to_editor_index, a.to_start, a.to_end, a.to_text,
                a.arrow_style
         FROM arrow a
         JOIN layer l ON a.layer_id = l.id
         WHERE l.workspace_id = ?1
         ORDER BY a.rowid",
    )?;
    let mut rows = stmt.query([workspace_id])?;

    let mut by_layer: HashMap<String, Vec<Arrow>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let layer_id: String = row.get(0)?;
        by_layer.entry(layer_id).or_default().push(Arrow {
            id: row.get(1)?,
            source: Endpoint {
                editor_index: row.get(2)?,
                start: row.get(3)?,
                end: row.get(4)?,
                text: row.get(5)?,
            },
            target: Endpoint {
                editor_index: row.get(6)?,
                start: row.get(7)?,
                end: row.get(8)?,
                text: row.get(9)?,
            },
            arrow_style: row.get(10)?,
        });
    }
    Ok(by_layer)
}

fn load_underlines(
    conn: &Connection,
    workspace_id: &str,
) -> Result<HashMap<String, Vec<Underline>>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT u.layer_id, u.id, u.editor_index, u.start_pos, u.end_pos, u.text
         FROM underline u
         JOIN layer l ON u.layer_id = l.id
         WHERE l.workspace_id = ?1
         ORDER BY u.rowid",
    )?;
    let mut rows = stmt.query([workspace_id])?;

    let mut by_layer: HashMap<String, Vec<Underline>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let layer_id: String = row.get(0)?;
        by_layer.entry(layer_id).or_default().push(Underline {
            id: row.get(1)?,
            editor_index: row.get(2)?,
            start: row.get(3)?,
            end: row.get(4)?,
            text: row.get(5)?,
        });
    }
    Ok(by_layer)
}

fn load_editors(conn: &Connection, workspace_id: &str) -> Result<Vec<Editor>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT index_pos, name, visible, content_json FROM editor
         WHERE workspace_id = ?1
         ORDER BY index_pos",
    )?;
    let mut rows = stmt.query([workspace_id])?;

    let mut editors = Vec::new();
    while let Some(row) = rows.next()? {
        let index: i64 = row.get(0)?;
        let raw: Option<String> = row.get(3)?;
        let content = match raw {
            Some(text) => match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("Discarding unreadable content of editor {index} in {workspace_id}: {e}");
                    None
                }
            },
            None => None,
        };
        editors.push(Editor {
            index,
            name: row.get(1)?,
            visible: row.get(2)?,
            content,
        });
    }
    Ok(editors)
}
