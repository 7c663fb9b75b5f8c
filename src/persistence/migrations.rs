//! # Database Migrations
//!
//! Creates and updates the SQLite schema. Versions are tracked in a
//! `schema_version` table and applied stepwise on startup.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Run all necessary migrations to bring the database up to date.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
            [],
            |row| row.get(0),
        )
        .context("Failed to check for schema_version table")?;

    if !table_exists {
        conn.execute(
            "CREATE TABLE schema_version (version INTEGER NOT NULL)",
            [],
        )
        .context("Failed to create schema_version table")?;
        conn.execute("INSERT INTO schema_version (version) VALUES (0)", [])
            .context("Failed to seed schema_version")?;
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .context("Failed to read schema version")?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("UPDATE schema_version SET version = ?1", [version])
        .context("Failed to update schema version")?;
    Ok(())
}

/// v1: the three core tables.
///
/// `deleted_transcriptions` carries no foreign keys on purpose: the shadow
/// row must outlive the live row and its diffs.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE transcriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            original_content TEXT NOT NULL,
            current_content TEXT NOT NULL,
            current_diff_id INTEGER REFERENCES transcription_diffs(id),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_modified_at TEXT,
            audio_file_path TEXT,
            duration_seconds REAL,
            speaker_map TEXT NOT NULL DEFAULT '{}',
            extra_metadata TEXT NOT NULL DEFAULT '{}',
            is_reviewed INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE transcription_diffs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            transcription_id INTEGER NOT NULL REFERENCES transcriptions(id),
            content TEXT NOT NULL,
            sequence_number INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX idx_diffs_transcription
            ON transcription_diffs(transcription_id, sequence_number);

        CREATE TABLE deleted_transcriptions (
            id INTEGER PRIMARY KEY,
            title TEXT,
            original_content TEXT NOT NULL,
            current_content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_modified_at TEXT,
            audio_file_path TEXT,
            duration_seconds REAL,
            speaker_map TEXT NOT NULL DEFAULT '{}',
            extra_metadata TEXT NOT NULL DEFAULT '{}',
            is_reviewed INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT NOT NULL,
            deleted_reason TEXT
        );
        "#,
    )
    .context("Failed to create v1 schema")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transcriptions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
