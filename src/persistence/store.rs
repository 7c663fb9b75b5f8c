//! # Transcription Store
//!
//! Owns the SQLite connection and implements every durable mutation. Each
//! mutating operation runs inside a single transaction so it either fully
//! happens or leaves no trace - in particular `delete`, which has to copy
//! the shadow row, null the `current_diff_id` back-reference, and purge the
//! diff rows before the live row goes away, in exactly that order.

use crate::error::{AppError, AppResult};
use crate::persistence::migrations;
use crate::persistence::models::{
    DeletedTranscription, Transcription, TranscriptionDiff, TranscriptionSummary,
    TranscriptionUpdate,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const TRANSCRIPTION_COLUMNS: &str = "id, title, original_content, current_content, \
     current_diff_id, created_at, updated_at, last_modified_at, audio_file_path, \
     duration_seconds, speaker_map, extra_metadata, is_reviewed";

/// The finished output of a recording session, ready to persist.
#[derive(Debug, Clone)]
pub struct SaveArtifact {
    pub title: Option<String>,
    /// Authoritative transcript from the final full-audio pass
    pub text: String,
    pub audio_file_path: Option<String>,
    /// Total artifact duration - on resume this is the combined total
    pub duration_seconds: Option<f64>,
    pub speaker_map: serde_json::Value,
    pub extra_metadata: serde_json::Value,
    /// Existing transcription this recording appended to, if resuming
    pub resume_of: Option<i64>,
}

impl SaveArtifact {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            title: None,
            text: text.into(),
            audio_file_path: None,
            duration_seconds: None,
            speaker_map: serde_json::json!({}),
            extra_metadata: serde_json::json!({}),
            resume_of: None,
        }
    }
}

/// SQLite-backed store for transcriptions, diffs, and the delete shadow.
pub struct TranscriptionStore {
    conn: Mutex<Connection>,
}

impl TranscriptionStore {
    /// Open (creating if needed) the database at `db_path` and migrate it.
    pub fn new(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::initialize(conn, &format!("{}", db_path.display()))
    }

    /// In-memory store for tests.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, ":memory:")
    }

    fn initialize(conn: Connection, label: &str) -> AppResult<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations::run_migrations(&conn)
            .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
        info!("Transcription store ready at {}", label);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_connection<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> AppResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::Internal(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Persist a finished recording.
    ///
    /// With `resume_of` set, the existing row is updated in place: the
    /// previous content is snapshotted as a diff, the authoritative
    /// transcript replaces it (the final pass covered the prior audio too),
    /// and duration moves to the new combined total - never downwards.
    pub fn save(&self, artifact: SaveArtifact) -> AppResult<Transcription> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let id = match artifact.resume_of {
                Some(prior_id) => save_resumed(&tx, prior_id, &artifact)?,
                None => save_new(&tx, &artifact)?,
            };
            let saved = get_by_id(&tx, id)?;
            tx.commit()?;
            Ok(saved)
        })
    }

    pub fn get(&self, id: i64) -> AppResult<Transcription> {
        self.with_connection(|conn| get_by_id(conn, id))
    }

    /// Page through live transcriptions, newest first. Returns the rows and
    /// the total count.
    pub fn list(&self, page: u32, page_size: u32) -> AppResult<(Vec<Transcription>, i64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);

        self.with_connection(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM transcriptions", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM transcriptions ORDER BY created_at DESC, id DESC \
                 LIMIT ?1 OFFSET ?2",
                TRANSCRIPTION_COLUMNS
            ))?;
            let rows = stmt
                .query_map(
                    params![page_size as i64, ((page - 1) * page_size) as i64],
                    row_to_transcription,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok((rows, total))
        })
    }

    /// Compact list for pickers, ordered by most recent activity, with the
    /// modification count (number of diffs) per row.
    pub fn summaries(&self) -> AppResult<Vec<TranscriptionSummary>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.title, t.current_content, t.created_at, t.last_modified_at, \
                        COUNT(d.id) \
                 FROM transcriptions t \
                 LEFT JOIN transcription_diffs d ON d.transcription_id = t.id \
                 GROUP BY t.id \
                 ORDER BY COALESCE(t.last_modified_at, t.created_at) DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    let content: String = row.get(2)?;
                    Ok(TranscriptionSummary {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        content_preview: Some(content.chars().take(100).collect()),
                        created_at: parse_ts(row.get(3)?)?,
                        last_modified_at: parse_opt_ts(row.get(4)?)?,
                        modification_count: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Edit-history entries in chronological (sequence) order.
    pub fn history(&self, id: i64) -> AppResult<Vec<TranscriptionDiff>> {
        self.with_connection(|conn| {
            // Distinguish "no edits" from "no such transcription"
            get_by_id(conn, id)?;

            let mut stmt = conn.prepare(
                "SELECT id, transcription_id, content, sequence_number, created_at \
                 FROM transcription_diffs WHERE transcription_id = ?1 \
                 ORDER BY sequence_number",
            )?;
            let rows = stmt
                .query_map([id], |row| {
                    Ok(TranscriptionDiff {
                        id: row.get(0)?,
                        transcription_id: row.get(1)?,
                        content: row.get(2)?,
                        sequence_number: row.get(3)?,
                        created_at: parse_ts(row.get(4)?)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Apply a partial update. A present `content` always records a diff of
    /// the previous content first - even when the new content is identical,
    /// so every edit call leaves a history entry.
    pub fn edit(&self, id: i64, update: TranscriptionUpdate) -> AppResult<Transcription> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let existing = get_by_id(&tx, id)?;
            let now = Utc::now();

            if let Some(new_content) = &update.content {
                let diff_id = insert_diff(&tx, id, &existing.current_content, now)?;
                tx.execute(
                    "UPDATE transcriptions \
                     SET current_content = ?1, current_diff_id = ?2, \
                         last_modified_at = ?3, updated_at = ?3 \
                     WHERE id = ?4",
                    params![new_content, diff_id, now.to_rfc3339(), id],
                )?;
            }

            if let Some(title) = &update.title {
                tx.execute(
                    "UPDATE transcriptions SET title = ?1, updated_at = ?2 WHERE id = ?3",
                    params![title, now.to_rfc3339(), id],
                )?;
            }

            if let Some(speaker_map) = &update.speaker_map {
                tx.execute(
                    "UPDATE transcriptions SET speaker_map = ?1, updated_at = ?2 WHERE id = ?3",
                    params![speaker_map.to_string(), now.to_rfc3339(), id],
                )?;
            }

            if let Some(extra_metadata) = &update.extra_metadata {
                tx.execute(
                    "UPDATE transcriptions SET extra_metadata = ?1, updated_at = ?2 WHERE id = ?3",
                    params![extra_metadata.to_string(), now.to_rfc3339(), id],
                )?;
            }

            if let Some(is_reviewed) = update.is_reviewed {
                tx.execute(
                    "UPDATE transcriptions SET is_reviewed = ?1, updated_at = ?2 WHERE id = ?3",
                    params![is_reviewed as i64, now.to_rfc3339(), id],
                )?;
            }

            let updated = get_by_id(&tx, id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Soft-delete: move the latest content into the shadow table and purge
    /// the diff history.
    ///
    /// Ordering inside the transaction matters: the back-reference is
    /// nulled before the diff rows go, so no statement ever observes a
    /// dangling `current_diff_id`.
    pub fn delete(&self, id: i64, reason: Option<&str>) -> AppResult<()> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let existing = get_by_id(&tx, id)?;
            let now = Utc::now();

            tx.execute(
                "INSERT INTO deleted_transcriptions \
                 (id, title, original_content, current_content, created_at, updated_at, \
                  last_modified_at, audio_file_path, duration_seconds, speaker_map, \
                  extra_metadata, is_reviewed, deleted_at, deleted_reason) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    existing.id,
                    existing.title,
                    // Latest content only; the edit history is not preserved
                    existing.current_content,
                    existing.current_content,
                    existing.created_at.to_rfc3339(),
                    existing.updated_at.to_rfc3339(),
                    existing.last_modified_at.map(|ts| ts.to_rfc3339()),
                    existing.audio_file_path,
                    existing.duration_seconds,
                    existing.speaker_map.to_string(),
                    existing.extra_metadata.to_string(),
                    existing.is_reviewed as i64,
                    now.to_rfc3339(),
                    reason,
                ],
            )?;

            tx.execute(
                "UPDATE transcriptions SET current_diff_id = NULL WHERE id = ?1",
                [id],
            )?;
            tx.execute(
                "DELETE FROM transcription_diffs WHERE transcription_id = ?1",
                [id],
            )?;
            tx.execute("DELETE FROM transcriptions WHERE id = ?1", [id])?;

            tx.commit()?;
            info!("Soft-deleted transcription {}", id);
            Ok(())
        })
    }

    /// Move a shadow row back into the live table under its original id.
    ///
    /// Fails with a conflict - changing nothing - when a live row with that
    /// id already exists. The restored row has no diff history.
    pub fn restore(&self, id: i64) -> AppResult<Transcription> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;

            let live_exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM transcriptions WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            if live_exists {
                return Err(AppError::Conflict(format!(
                    "Transcription {} already exists; cannot restore over it",
                    id
                )));
            }

            let deleted = get_deleted_by_id(&tx, id)?;

            tx.execute(
                "INSERT INTO transcriptions \
                 (id, title, original_content, current_content, current_diff_id, created_at, \
                  updated_at, last_modified_at, audio_file_path, duration_seconds, speaker_map, \
                  extra_metadata, is_reviewed) \
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    deleted.id,
                    deleted.title,
                    deleted.original_content,
                    deleted.current_content,
                    deleted.created_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                    deleted.last_modified_at.map(|ts| ts.to_rfc3339()),
                    deleted.audio_file_path,
                    deleted.duration_seconds,
                    deleted.speaker_map.to_string(),
                    deleted.extra_metadata.to_string(),
                    deleted.is_reviewed as i64,
                ],
            )?;
            tx.execute("DELETE FROM deleted_transcriptions WHERE id = ?1", [id])?;

            let restored = get_by_id(&tx, id)?;
            tx.commit()?;
            info!("Restored transcription {}", id);
            Ok(restored)
        })
    }

    /// Shadow rows, most recently deleted first.
    pub fn list_deleted(&self) -> AppResult<Vec<DeletedTranscription>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, original_content, current_content, created_at, updated_at, \
                        last_modified_at, audio_file_path, duration_seconds, speaker_map, \
                        extra_metadata, is_reviewed, deleted_at, deleted_reason \
                 FROM deleted_transcriptions ORDER BY deleted_at DESC",
            )?;
            let rows = stmt
                .query_map([], row_to_deleted)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn save_new(conn: &Connection, artifact: &SaveArtifact) -> AppResult<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO transcriptions \
         (title, original_content, current_content, current_diff_id, created_at, updated_at, \
          last_modified_at, audio_file_path, duration_seconds, speaker_map, extra_metadata, \
          is_reviewed) \
         VALUES (?1, ?2, ?2, NULL, ?3, ?3, NULL, ?4, ?5, ?6, ?7, 0)",
        params![
            artifact.title,
            artifact.text,
            now,
            artifact.audio_file_path,
            artifact.duration_seconds,
            artifact.speaker_map.to_string(),
            artifact.extra_metadata.to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn save_resumed(conn: &Connection, prior_id: i64, artifact: &SaveArtifact) -> AppResult<i64> {
    let existing = get_by_id(conn, prior_id)?;
    let now = Utc::now();

    // Snapshot the content the resumed recording replaces
    let diff_id = insert_diff(conn, prior_id, &existing.current_content, now)?;

    // Duration is monotonically non-decreasing across resumed sessions
    let duration = match (artifact.duration_seconds, existing.duration_seconds) {
        (Some(new), Some(old)) => Some(new.max(old)),
        (Some(new), None) => Some(new),
        (None, old) => old,
    };
    let audio_file_path = artifact
        .audio_file_path
        .clone()
        .or(existing.audio_file_path);

    conn.execute(
        "UPDATE transcriptions \
         SET current_content = ?1, current_diff_id = ?2, audio_file_path = ?3, \
             duration_seconds = ?4, last_modified_at = ?5, updated_at = ?5 \
         WHERE id = ?6",
        params![
            artifact.text,
            diff_id,
            audio_file_path,
            duration,
            now.to_rfc3339(),
            prior_id,
        ],
    )?;

    Ok(prior_id)
}

fn insert_diff(
    conn: &Connection,
    transcription_id: i64,
    previous_content: &str,
    now: DateTime<Utc>,
) -> AppResult<i64> {
    let next_seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM transcription_diffs \
         WHERE transcription_id = ?1",
        [transcription_id],
        |row| row.get(0),
    )?;

    conn.execute(
        "INSERT INTO transcription_diffs (transcription_id, content, sequence_number, created_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![transcription_id, previous_content, next_seq, now.to_rfc3339()],
    )?;

    Ok(conn.last_insert_rowid())
}

fn get_by_id(conn: &Connection, id: i64) -> AppResult<Transcription> {
    conn.query_row(
        &format!(
            "SELECT {} FROM transcriptions WHERE id = ?1",
            TRANSCRIPTION_COLUMNS
        ),
        [id],
        row_to_transcription,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("Transcription {} not found", id))
        }
        other => other.into(),
    })
}

fn get_deleted_by_id(conn: &Connection, id: i64) -> AppResult<DeletedTranscription> {
    conn.query_row(
        "SELECT id, title, original_content, current_content, created_at, updated_at, \
                last_modified_at, audio_file_path, duration_seconds, speaker_map, \
                extra_metadata, is_reviewed, deleted_at, deleted_reason \
         FROM deleted_transcriptions WHERE id = ?1",
        [id],
        row_to_deleted,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => {
            AppError::NotFound(format!("Deleted transcription {} not found", id))
        }
        other => other.into(),
    })
}

fn row_to_transcription(row: &Row<'_>) -> rusqlite::Result<Transcription> {
    Ok(Transcription {
        id: row.get(0)?,
        title: row.get(1)?,
        original_content: row.get(2)?,
        current_content: row.get(3)?,
        current_diff_id: row.get(4)?,
        created_at: parse_ts(row.get(5)?)?,
        updated_at: parse_ts(row.get(6)?)?,
        last_modified_at: parse_opt_ts(row.get(7)?)?,
        audio_file_path: row.get(8)?,
        duration_seconds: row.get(9)?,
        speaker_map: parse_json(row.get(10)?)?,
        extra_metadata: parse_json(row.get(11)?)?,
        is_reviewed: row.get::<_, i64>(12)? != 0,
    })
}

fn row_to_deleted(row: &Row<'_>) -> rusqlite::Result<DeletedTranscription> {
    Ok(DeletedTranscription {
        id: row.get(0)?,
        title: row.get(1)?,
        original_content: row.get(2)?,
        current_content: row.get(3)?,
        created_at: parse_ts(row.get(4)?)?,
        updated_at: parse_ts(row.get(5)?)?,
        last_modified_at: parse_opt_ts(row.get(6)?)?,
        audio_file_path: row.get(7)?,
        duration_seconds: row.get(8)?,
        speaker_map: parse_json(row.get(9)?)?,
        extra_metadata: parse_json(row.get(10)?)?,
        is_reviewed: row.get::<_, i64>(11)? != 0,
        deleted_at: parse_ts(row.get(12)?)?,
        deleted_reason: row.get(13)?,
    })
}

fn parse_ts(value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(parse_ts).transpose()
}

fn parse_json(value: String) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TranscriptionStore {
        TranscriptionStore::in_memory().unwrap()
    }

    fn saved(store: &TranscriptionStore, text: &str) -> Transcription {
        store.save(SaveArtifact::new(text)).unwrap()
    }

    fn edit_content(content: &str) -> TranscriptionUpdate {
        TranscriptionUpdate {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_save_initializes_both_contents() {
        let store = store();
        let t = saved(&store, "hello world");

        assert_eq!(t.original_content, "hello world");
        assert_eq!(t.current_content, "hello world");
        assert!(t.current_diff_id.is_none());
        assert!(store.history(t.id).unwrap().is_empty());
    }

    #[test]
    fn test_edit_records_previous_content() {
        let store = store();
        let t = saved(&store, "hello world");

        let updated = store.edit(t.id, edit_content("hello there")).unwrap();
        assert_eq!(updated.current_content, "hello there");
        assert_eq!(updated.original_content, "hello world");
        assert!(updated.current_diff_id.is_some());
        assert!(updated.last_modified_at.is_some());

        let history = store.history(t.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello world");
        assert_eq!(history[0].sequence_number, 1);
        assert_eq!(updated.current_diff_id, Some(history[0].id));
    }

    #[test]
    fn test_noop_edits_each_record_a_diff() {
        let store = store();
        let t = saved(&store, "same text");

        store.edit(t.id, edit_content("same text")).unwrap();
        let after = store.edit(t.id, edit_content("same text")).unwrap();

        assert_eq!(after.current_content, "same text");
        let history = store.history(t.id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|d| d.content == "same text"));
        assert_eq!(
            history.iter().map(|d| d.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_edit_without_content_leaves_history_alone() {
        let store = store();
        let t = saved(&store, "text");

        let update = TranscriptionUpdate {
            title: Some("Renamed".to_string()),
            is_reviewed: Some(true),
            ..Default::default()
        };
        let updated = store.edit(t.id, update).unwrap();

        assert_eq!(updated.title.as_deref(), Some("Renamed"));
        assert!(updated.is_reviewed);
        assert!(store.history(t.id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_moves_latest_content_to_shadow() {
        let store = store();
        let t = saved(&store, "hello world");
        store.edit(t.id, edit_content("hello there")).unwrap();

        store.delete(t.id, Some("cleanup")).unwrap();

        // Gone from the live side, diffs purged with it
        assert!(matches!(store.get(t.id), Err(AppError::NotFound(_))));
        let (rows, total) = store.list(1, 20).unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);

        let deleted = store.list_deleted().unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, t.id);
        assert_eq!(deleted[0].current_content, "hello there");
        assert_eq!(deleted[0].deleted_reason.as_deref(), Some("cleanup"));
    }

    #[test]
    fn test_restore_round_trip_loses_history_only() {
        let store = store();
        let t = saved(&store, "hello world");
        store.edit(t.id, edit_content("hello there")).unwrap();
        store.delete(t.id, None).unwrap();

        let restored = store.restore(t.id).unwrap();

        assert_eq!(restored.id, t.id);
        assert_eq!(restored.current_content, "hello there");
        assert!(restored.current_diff_id.is_none());
        assert!(store.history(t.id).unwrap().is_empty());
        assert!(store.list_deleted().unwrap().is_empty());
    }

    #[test]
    fn test_restore_of_never_deleted_id_is_not_found() {
        let store = store();
        let t = saved(&store, "still alive");

        // No shadow row exists for a live id
        store.delete(t.id, None).unwrap();
        store.restore(t.id).unwrap();
        assert!(matches!(store.restore(t.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_restore_over_live_id_is_conflict() {
        let store = store();
        let t = saved(&store, "live");

        // Manufacture a shadow row whose id collides with the live row
        store
            .with_connection(|conn| {
                conn.execute(
                    "INSERT INTO deleted_transcriptions \
                     (id, title, original_content, current_content, created_at, updated_at, \
                      speaker_map, extra_metadata, is_reviewed, deleted_at) \
                     VALUES (?1, NULL, 'x', 'x', ?2, ?2, '{}', '{}', 0, ?2)",
                    params![t.id, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .unwrap();

        let result = store.restore(t.id);
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // The failed restore changed nothing on either side
        assert!(store.get(t.id).is_ok());
        assert_eq!(store.list_deleted().unwrap().len(), 1);
    }

    #[test]
    fn test_resumed_save_replaces_content_and_extends_duration() {
        let store = store();
        let mut artifact = SaveArtifact::new("hello there");
        artifact.duration_seconds = Some(9.0);
        artifact.audio_file_path = Some("/api/audio/a.wav".to_string());
        let t = store.save(artifact).unwrap();

        let mut resumed = SaveArtifact::new("hello there and more words");
        resumed.duration_seconds = Some(14.0);
        resumed.resume_of = Some(t.id);
        let updated = store.save(resumed).unwrap();

        assert_eq!(updated.id, t.id);
        assert_eq!(updated.current_content, "hello there and more words");
        // The first transcript stays the immutable original
        assert_eq!(updated.original_content, "hello there");
        assert_eq!(updated.duration_seconds, Some(14.0));

        // The replaced content is preserved in the history
        let history = store.history(t.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "hello there");
    }

    #[test]
    fn test_resumed_save_never_shrinks_duration() {
        let store = store();
        let mut artifact = SaveArtifact::new("long recording");
        artifact.duration_seconds = Some(20.0);
        let t = store.save(artifact).unwrap();

        let mut resumed = SaveArtifact::new("new text");
        resumed.duration_seconds = Some(5.0);
        resumed.resume_of = Some(t.id);
        let updated = store.save(resumed).unwrap();

        assert_eq!(updated.duration_seconds, Some(20.0));
    }

    #[test]
    fn test_resume_of_missing_id_is_not_found() {
        let store = store();
        let mut artifact = SaveArtifact::new("text");
        artifact.resume_of = Some(999);
        assert!(matches!(store.save(artifact), Err(AppError::NotFound(_))));
        // Nothing was created by the failed save
        let (_, total) = store.list(1, 20).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn test_list_pagination() {
        let store = store();
        for i in 0..3 {
            saved(&store, &format!("note {}", i));
        }

        let (page1, total) = store.list(1, 2).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page1.len(), 2);

        let (page2, _) = store.list(2, 2).unwrap();
        assert_eq!(page2.len(), 1);

        let mut seen: Vec<i64> = page1.iter().chain(page2.iter()).map(|t| t.id).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_summaries_report_modification_counts() {
        let store = store();
        let a = saved(&store, "alpha text that is long enough to preview");
        let b = saved(&store, "beta");
        store.edit(a.id, edit_content("alpha v2")).unwrap();
        store.edit(a.id, edit_content("alpha v3")).unwrap();

        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 2);

        let of_a = summaries.iter().find(|s| s.id == a.id).unwrap();
        assert_eq!(of_a.modification_count, 2);
        assert_eq!(of_a.content_preview.as_deref(), Some("alpha v3"));

        let of_b = summaries.iter().find(|s| s.id == b.id).unwrap();
        assert_eq!(of_b.modification_count, 0);

        // Most recently modified first
        assert_eq!(summaries[0].id, a.id);
    }
}
