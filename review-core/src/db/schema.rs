use rusqlite::{Connection, OptionalExtension};

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

pub const SCHEMA_VERSION_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL
);
"#;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pr_status (
    pr_number TEXT PRIMARY KEY,
    status TEXT NOT NULL CHECK (status IN ('in_progress', 'completed')),
    current_index INTEGER NOT NULL DEFAULT 0,
    total_files INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pr_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pr_number TEXT NOT NULL REFERENCES pr_status(pr_number) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    reviewed INTEGER NOT NULL DEFAULT 0,
    review_order INTEGER NOT NULL,
    UNIQUE(pr_number, file_path)
);

CREATE INDEX IF NOT EXISTS idx_pr_files_order ON pr_files(pr_number, review_order);
"#;

/// Brings the schema up to `CURRENT_SCHEMA_VERSION`. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_VERSION_DDL)?;

    let version: i64 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);

    if version < 1 {
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            [CURRENT_SCHEMA_VERSION],
        )?;
        tx.commit()?;
        tracing::debug!("Applied review schema v{}", CURRENT_SCHEMA_VERSION);
    }

    Ok(())
}
