//! Workspace domain types.
//!
//! Offsets and endpoints carry explicit Rust names (`start`/`end`,
//! `source`/`target`); serde maps them onto the `from`/`to` keys the
//! browser client speaks.

use serde::{Deserialize, Serialize};

/// Name given to the editor every new workspace is seeded with.
pub const DEFAULT_EDITOR_NAME: &str = "Passage 1";

/// Arrow style used when a client does not send one.
pub const DEFAULT_ARROW_STYLE: &str = "solid";

fn default_arrow_style() -> String {
    DEFAULT_ARROW_STYLE.to_string()
}

fn default_visible() -> bool {
    true
}

/// Complete reconstructed state of one workspace, sent on connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSnapshot {
    pub workspace_id: String,
    /// Ascending by layer position
    pub layers: Vec<Layer>,
    /// Ascending by editor index
    pub editors: Vec<Editor>,
}

impl WorkspaceSnapshot {
    /// Look up a layer by id.
    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }
}

/// A named, colored annotation overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub arrows: Vec<Arrow>,
    #[serde(default)]
    pub underlines: Vec<Underline>,
}

/// A marked text range inside one editor.
///
/// `start <= end` is expected but left to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub id: String,
    pub editor_index: i64,
    #[serde(rename = "from")]
    pub start: i64,
    #[serde(rename = "to")]
    pub end: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub annotation: String,
}

/// One side of an arrow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub editor_index: i64,
    #[serde(rename = "from")]
    pub start: i64,
    #[serde(rename = "to")]
    pub end: i64,
    #[serde(default)]
    pub text: String,
}

/// Directed link between two text ranges, possibly in different editors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrow {
    pub id: String,
    #[serde(rename = "from")]
    pub source: Endpoint,
    #[serde(rename = "to")]
    pub target: Endpoint,
    #[serde(default = "default_arrow_style")]
    pub arrow_style: String,
}

/// An underlined text range; rendered differently from a highlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Underline {
    pub id: String,
    pub editor_index: i64,
    #[serde(rename = "from")]
    pub start: i64,
    #[serde(rename = "to")]
    pub end: i64,
    #[serde(default)]
    pub text: String,
}

/// One text passage section of a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Editor {
    /// Contiguous 0-based position within the workspace
    pub index: i64,
    pub name: String,
    pub visible: bool,
    /// Rich-text document, `None` until the first edit
    #[serde(rename = "contentJson")]
    pub content: Option<serde_json::Value>,
}

/// Access level granted by a share link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Edit,
    Readonly,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Access::Edit => "edit",
            Access::Readonly => "readonly",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "edit" => Some(Access::Edit),
            "readonly" => Some(Access::Readonly),
            _ => None,
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A short code granting access to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    pub code: String,
    pub workspace_id: String,
    pub access: Access,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_highlight_wire_names() {
        let h = Highlight {
            id: "h1".into(),
            editor_index: 0,
            start: 3,
            end: 9,
            text: "In the".into(),
            annotation: String::new(),
        };
        let value = serde_json::to_value(&h).unwrap();
        assert_eq!(value["from"], 3);
        assert_eq!(value["to"], 9);
        assert_eq!(value["editorIndex"], 0);
        assert!(value.get("start").is_none());
    }

    #[test]
    fn test_highlight_optional_fields_default() {
        let h: Highlight = serde_json::from_value(json!({
            "id": "h1", "editorIndex": 1, "from": 0, "to": 4
        }))
        .unwrap();
        assert_eq!(h.text, "");
        assert_eq!(h.annotation, "");
        assert_eq!(h.editor_index, 1);
    }

    #[test]
    fn test_arrow_endpoints_map_to_from_and_to() {
        let arrow: Arrow = serde_json::from_value(json!({
            "id": "a1",
            "from": {"editorIndex": 0, "from": 1, "to": 5, "text": "word"},
            "to": {"editorIndex": 1, "from": 7, "to": 9}
        }))
        .unwrap();
        assert_eq!(arrow.source.text, "word");
        assert_eq!(arrow.source.start, 1);
        assert_eq!(arrow.target.editor_index, 1);
        assert_eq!(arrow.target.text, "");
        assert_eq!(arrow.arrow_style, DEFAULT_ARROW_STYLE);

        let back = serde_json::to_value(&arrow).unwrap();
        assert_eq!(back["from"]["to"], 5);
        assert_eq!(back["arrowStyle"], "solid");
    }

    #[test]
    fn test_editor_content_key() {
        let editor = Editor {
            index: 0,
            name: DEFAULT_EDITOR_NAME.into(),
            visible: true,
            content: None,
        };
        let value = serde_json::to_value(&editor).unwrap();
        assert!(value["contentJson"].is_null());
        assert_eq!(value["name"], "Passage 1");
    }

    #[test]
    fn test_access_parse() {
        assert_eq!(Access::parse("edit"), Some(Access::Edit));
        assert_eq!(Access::parse("readonly"), Some(Access::Readonly));
        assert_eq!(Access::parse("admin"), None);
        assert_eq!(Access::Readonly.to_string(), "readonly");
    }
}
