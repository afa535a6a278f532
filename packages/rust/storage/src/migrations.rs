//! SQL migration definitions for the checkpoint database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: checkpoints",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per (run date, phase); re-saving a phase replaces its row
CREATE TABLE IF NOT EXISTS checkpoints (
    date       TEXT NOT NULL,
    phase      TEXT NOT NULL,
    payload    TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (date, phase)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_date ON checkpoints(date);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
