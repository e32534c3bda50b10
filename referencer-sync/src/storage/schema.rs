//! Version-gated schema upgrades.
//!
//! Each entry is applied once, in ascending order, inside its own
//! transaction together with the version bump. Versions at or below the
//! recorded one are skipped, so running [`migrate`] repeatedly is a no-op.

use rusqlite::Connection;

use super::StoreError;

/// Upgrade scripts keyed by the version they bring the database to.
pub const MIGRATIONS: &[(u32, &str)] = &[
    (1, V1_CORE_TABLES),
    (2, V2_UNDERLINES_AND_ARROW_STYLE),
    (3, V3_INDEXES),
];

const V1_CORE_TABLES: &str = r#"
CREATE TABLE workspace (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE layer (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspace(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    color TEXT NOT NULL,
    visible INTEGER NOT NULL DEFAULT 1,
    position INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE highlight (
    id TEXT PRIMARY KEY,
    layer_id TEXT NOT NULL REFERENCES layer(id) ON DELETE CASCADE,
    editor_index INTEGER NOT NULL,
    start_pos INTEGER NOT NULL,
    end_pos INTEGER NOT NULL,
    text TEXT NOT NULL DEFAULT '',
    annotation TEXT NOT NULL DEFAULT ''
);

CREATE TABLE arrow (
    id TEXT PRIMARY KEY,
    layer_id TEXT NOT NULL REFERENCES layer(id) ON DELETE CASCADE,
    from_editor_index INTEGER NOT NULL,
    from_start INTEGER NOT NULL,
    from_end INTEGER NOT NULL,
    from_text TEXT NOT NULL DEFAULT '',
    to_editor_index INTEGER NOT NULL,
    to_start INTEGER NOT NULL,
    to_end INTEGER NOT NULL,
    to_text TEXT NOT NULL DEFAULT ''
);

-- Editors get a server-side rowid so re-indexing can address rows while
-- index_pos is being rewritten.
CREATE TABLE editor (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id TEXT NOT NULL REFERENCES workspace(id) ON DELETE CASCADE,
    index_pos INTEGER NOT NULL,
    name TEXT NOT NULL DEFAULT 'Passage',
    visible INTEGER NOT NULL DEFAULT 1,
    content_json TEXT
);

CREATE TABLE share_link (
    code TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspace(id) ON DELETE CASCADE,
    access TEXT NOT NULL CHECK (access IN ('edit', 'readonly')),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const V2_UNDERLINES_AND_ARROW_STYLE: &str = r#"
CREATE TABLE underline (
    id TEXT PRIMARY KEY,
    layer_id TEXT NOT NULL REFERENCES layer(id) ON DELETE CASCADE,
    editor_index INTEGER NOT NULL,
    start_pos INTEGER NOT NULL,
    end_pos INTEGER NOT NULL,
    text TEXT NOT NULL DEFAULT ''
);

ALTER TABLE arrow ADD COLUMN arrow_style TEXT NOT NULL DEFAULT 'solid';
"#;

const V3_INDEXES: &str = r#"
CREATE INDEX idx_layer_workspace ON layer(workspace_id, position);
CREATE INDEX idx_highlight_layer ON highlight(layer_id);
CREATE INDEX idx_arrow_layer ON arrow(layer_id);
CREATE INDEX idx_underline_layer ON underline(layer_id);
CREATE UNIQUE INDEX idx_editor_workspace_index ON editor(workspace_id, index_pos);
"#;

/// Highest version this build knows how to produce.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |(v, _)| *v)
}

/// Version currently recorded in the database (0 for a fresh file).
pub fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply every pending upgrade. Returns the resulting version.
pub fn migrate(conn: &mut Connection) -> Result<u32, StoreError> {
    let start = current_version(conn)?;
    let mut version = start;

    for (target, script) in MIGRATIONS.iter().filter(|(v, _)| *v > start) {
        let tx = conn.transaction()?;
        tx.execute_batch(script)
            .map_err(|source| StoreError::Migration { version: *target, source })?;
        tx.execute("DELETE FROM schema_version", [])?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [target])?;
        tx.commit()?;

        log::info!("Schema upgraded from version {version} to {target}");
        version = *target;
    }

    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_ascending() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
        assert_eq!(latest_version(), 3);
    }

    #[test]
    fn test_migrate_fresh_database() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
        assert_eq!(migrate(&mut conn).unwrap(), latest_version());

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('workspace', 'layer', 'highlight', 'arrow', 'underline', 'editor', 'share_link')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        assert_eq!(migrate(&mut conn).unwrap(), latest_version());

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_migrate_resumes_from_recorded_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        current_version(&conn).unwrap();
        conn.execute_batch(V1_CORE_TABLES).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", []).unwrap();

        assert_eq!(migrate(&mut conn).unwrap(), 3);

        let style: String = conn
            .query_row(
                "SELECT dflt_value FROM pragma_table_info('arrow') WHERE name = 'arrow_style'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(style, "'solid'");
    }
}
