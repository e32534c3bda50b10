//! Workspace mutations requested by clients.
//!
//! The client sends `{type, payload}`; the processor flattens that into
//! `{actionType, ...payload}` (the same object peers receive in the
//! `action` broadcast) and decodes it into a typed [`Action`]. Every
//! required field is checked during decoding, before the store is touched.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::model::{Arrow, Highlight, Underline};
use crate::storage::{StoreError, WorkspaceStore};

/// Key under which the action name travels in a flattened payload.
pub const ACTION_TYPE_KEY: &str = "actionType";

/// Closed set of action names understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    AddLayer,
    RemoveLayer,
    UpdateLayerName,
    UpdateLayerColor,
    ToggleLayerVisibility,
    ReorderLayers,
    AddHighlight,
    RemoveHighlight,
    UpdateHighlightAnnotation,
    AddArrow,
    RemoveArrow,
    UpdateArrowStyle,
    AddUnderline,
    RemoveUnderline,
    AddEditor,
    RemoveEditor,
    UpdateSectionName,
    ToggleSectionVisibility,
    ReorderEditors,
    UpdateEditorContent,
}

impl ActionKind {
    pub const ALL: [ActionKind; 20] = [
        ActionKind::AddLayer,
        ActionKind::RemoveLayer,
        ActionKind::UpdateLayerName,
        ActionKind::UpdateLayerColor,
        ActionKind::ToggleLayerVisibility,
        ActionKind::ReorderLayers,
        ActionKind::AddHighlight,
        ActionKind::RemoveHighlight,
        ActionKind::UpdateHighlightAnnotation,
        ActionKind::AddArrow,
        ActionKind::RemoveArrow,
        ActionKind::UpdateArrowStyle,
        ActionKind::AddUnderline,
        ActionKind::RemoveUnderline,
        ActionKind::AddEditor,
        ActionKind::RemoveEditor,
        ActionKind::UpdateSectionName,
        ActionKind::ToggleSectionVisibility,
        ActionKind::ReorderEditors,
        ActionKind::UpdateEditorContent,
    ];

    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::AddLayer => "addLayer",
            ActionKind::RemoveLayer => "removeLayer",
            ActionKind::UpdateLayerName => "updateLayerName",
            ActionKind::UpdateLayerColor => "updateLayerColor",
            ActionKind::ToggleLayerVisibility => "toggleLayerVisibility",
            ActionKind::ReorderLayers => "reorderLayers",
            ActionKind::AddHighlight => "addHighlight",
            ActionKind::RemoveHighlight => "removeHighlight",
            ActionKind::UpdateHighlightAnnotation => "updateHighlightAnnotation",
            ActionKind::AddArrow => "addArrow",
            ActionKind::RemoveArrow => "removeArrow",
            ActionKind::UpdateArrowStyle => "updateArrowStyle",
            ActionKind::AddUnderline => "addUnderline",
            ActionKind::RemoveUnderline => "removeUnderline",
            ActionKind::AddEditor => "addEditor",
            ActionKind::RemoveEditor => "removeEditor",
            ActionKind::UpdateSectionName => "updateSectionName",
            ActionKind::ToggleSectionVisibility => "toggleSectionVisibility",
            ActionKind::ReorderEditors => "reorderEditors",
            ActionKind::UpdateEditorContent => "updateEditorContent",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded, validated mutation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "actionType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    AddLayer {
        id: String,
        name: String,
        color: String,
    },
    RemoveLayer {
        id: String,
    },
    UpdateLayerName {
        id: String,
        name: String,
    },
    UpdateLayerColor {
        id: String,
        color: String,
    },
    ToggleLayerVisibility {
        id: String,
    },
    ReorderLayers {
        layer_ids: Vec<String>,
    },
    AddHighlight {
        layer_id: String,
        highlight: Highlight,
    },
    RemoveHighlight {
        layer_id: String,
        highlight_id: String,
    },
    UpdateHighlightAnnotation {
        layer_id: String,
        highlight_id: String,
        annotation: String,
    },
    AddArrow {
        layer_id: String,
        arrow: Arrow,
    },
    RemoveArrow {
        layer_id: String,
        arrow_id: String,
    },
    UpdateArrowStyle {
        layer_id: String,
        arrow_id: String,
        arrow_style: String,
    },
    AddUnderline {
        layer_id: String,
        underline: Underline,
    },
    RemoveUnderline {
        layer_id: String,
        underline_id: String,
    },
    AddEditor {
        index: i64,
        name: String,
    },
    RemoveEditor {
        index: i64,
    },
    UpdateSectionName {
        index: i64,
        name: String,
    },
    ToggleSectionVisibility {
        index: i64,
    },
    ReorderEditors {
        permutation: Vec<i64>,
    },
    UpdateEditorContent {
        editor_index: i64,
        content_json: Value,
    },
}

/// Action failures, reported back to the sender as `error` messages.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Invalid payload for {action}: {reason}")]
    InvalidPayload { action: ActionKind, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Action {
    /// Decode a flattened `{actionType, ...fields}` object.
    pub fn decode(flattened: &Value) -> Result<Self, ActionError> {
        let name = flattened
            .get(ACTION_TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let kind = ActionKind::parse(name).ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;

        let action = Action::deserialize(flattened).map_err(|e| ActionError::InvalidPayload {
            action: kind,
            reason: e.to_string(),
        })?;

        if let Action::UpdateEditorContent { content_json, .. } = &action {
            if content_json.is_null() {
                return Err(ActionError::InvalidPayload {
                    action: kind,
                    reason: "contentJson must not be null".to_string(),
                });
            }
        }
        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AddLayer { .. } => ActionKind::AddLayer,
            Action::RemoveLayer { .. } => ActionKind::RemoveLayer,
            Action::UpdateLayerName { .. } => ActionKind::UpdateLayerName,
            Action::UpdateLayerColor { .. } => ActionKind::UpdateLayerColor,
            Action::ToggleLayerVisibility { .. } => ActionKind::ToggleLayerVisibility,
            Action::ReorderLayers { .. } => ActionKind::ReorderLayers,
            Action::AddHighlight { .. } => ActionKind::AddHighlight,
            Action::RemoveHighlight { .. } => ActionKind::RemoveHighlight,
            Action::UpdateHighlightAnnotation { .. } => ActionKind::UpdateHighlightAnnotation,
            Action::AddArrow { .. } => ActionKind::AddArrow,
            Action::RemoveArrow { .. } => ActionKind::RemoveArrow,
            Action::UpdateArrowStyle { .. } => ActionKind::UpdateArrowStyle,
            Action::AddUnderline { .. } => ActionKind::AddUnderline,
            Action::RemoveUnderline { .. } => ActionKind::RemoveUnderline,
            Action::AddEditor { .. } => ActionKind::AddEditor,
            Action::RemoveEditor { .. } => ActionKind::RemoveEditor,
            Action::UpdateSectionName { .. } => ActionKind::UpdateSectionName,
            Action::ToggleSectionVisibility { .. } => ActionKind::ToggleSectionVisibility,
            Action::ReorderEditors { .. } => ActionKind::ReorderEditors,
            Action::UpdateEditorContent { .. } => ActionKind::UpdateEditorContent,
        }
    }

    /// Apply the action to `workspace_id` as a single store transaction.
    pub fn apply(&self, store: &WorkspaceStore, workspace_id: &str) -> Result<(), StoreError> {
        let ws = workspace_id;
        match self {
            Action::AddLayer { id, name, color } => store.add_layer(ws, id, name, color),
            Action::RemoveLayer { id } => store.remove_layer(ws, id),
            Action::UpdateLayerName { id, name } => store.update_layer_name(ws, id, name),
            Action::UpdateLayerColor { id, color } => store.update_layer_color(ws, id, color),
            Action::ToggleLayerVisibility { id } => store.toggle_layer_visibility(ws, id),
            Action::ReorderLayers { layer_ids } => store.reorder_layers(ws, layer_ids),
            Action::AddHighlight { layer_id, highlight } => store.add_highlight(ws, layer_id, highlight),
            Action::RemoveHighlight { layer_id, highlight_id } => {
                store.remove_highlight(ws, layer_id, highlight_id)
            }
            Action::UpdateHighlightAnnotation {
                layer_id,
                highlight_id,
                annotation,
            } => store.update_highlight_annotation(ws, layer_id, highlight_id, annotation),
            Action::AddArrow { layer_id, arrow } => store.add_arrow(ws, layer_id, arrow),
            Action::RemoveArrow { layer_id, arrow_id } => store.remove_arrow(ws, layer_id, arrow_id),
            Action::UpdateArrowStyle {
                layer_id,
                arrow_id,
                arrow_style,
            } => store.update_arrow_style(ws, layer_id, arrow_id, arrow_style),
            Action::AddUnderline { layer_id, underline } => store.add_underline(ws, layer_id, underline),
            Action::RemoveUnderline { layer_id, underline_id } => {
                store.remove_underline(ws, layer_id, underline_id)
            }
            Action::AddEditor { index, name } => store.add_editor(ws, *index, name),
            Action::RemoveEditor { index } => store.remove_editor(ws, *index),
            Action::UpdateSectionName { index, name } => store.update_section_name(ws, *index, name),
            Action::ToggleSectionVisibility { index } => store.toggle_section_visibility(ws, *index),
            Action::ReorderEditors { permutation } => store.reorder_editors(ws, permutation),
            Action::UpdateEditorContent {
                editor_index,
                content_json,
            } => store.update_editor_content(ws, *editor_index, content_json),
        }
    }
}

/// Decodes and applies actions against the shared store.
#[derive(Clone)]
pub struct ActionProcessor {
    store: Arc<WorkspaceStore>,
}

impl ActionProcessor {
    pub fn new(store: Arc<WorkspaceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    /// Decode `flattened` and apply it to `workspace_id`.
    ///
    /// Nothing is written unless decoding succeeds.
    pub fn process(&self, workspace_id: &str, flattened: &Value) -> Result<Action, ActionError> {
        let action = Action::decode(flattened)?;
        action.apply(&self.store, workspace_id)?;
        log::debug!("Applied {} to workspace {workspace_id}", action.kind());
        Ok(action)
    }
}
