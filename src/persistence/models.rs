//! # Persistence Models
//!
//! Row structs for the three tables and the serde schemas the REST surface
//! exchanges. Responses always serve the *current* content under the
//! `content` key; `original_content` is the immutable first transcript and
//! only travels in full detail responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live transcription row.
#[derive(Debug, Clone, Serialize)]
pub struct Transcription {
    pub id: i64,
    pub title: Option<String>,
    /// Text as first produced by the engine; never modified after creation
    pub original_content: String,
    /// Latest edited text
    pub current_content: String,
    /// Most recent diff, if the content was ever mutated
    pub current_diff_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub audio_file_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub speaker_map: serde_json::Value,
    pub extra_metadata: serde_json::Value,
    pub is_reviewed: bool,
}

/// One immutable edit-history entry.
///
/// `content` is the full snapshot of the content *before* the edit that
/// created this diff - never a patch, so restore logic cannot compound
/// errors across entries.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionDiff {
    pub id: i64,
    pub transcription_id: i64,
    pub content: String,
    pub sequence_number: i64,
    pub created_at: DateTime<Utc>,
}

/// Soft-delete shadow of a transcription.
///
/// Holds the latest content only; the diff history is discarded on delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeletedTranscription {
    pub id: i64,
    pub title: Option<String>,
    pub original_content: String,
    pub current_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub audio_file_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub speaker_map: serde_json::Value,
    pub extra_metadata: serde_json::Value,
    pub is_reviewed: bool,
    pub deleted_at: DateTime<Utc>,
    pub deleted_reason: Option<String>,
}

/// Request body for creating a transcription (the save operation).
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionCreate {
    pub title: Option<String>,
    pub content: String,
    pub audio_file_path: Option<String>,
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub speaker_map: Option<serde_json::Value>,
    #[serde(default, alias = "metadata")]
    pub extra_metadata: Option<serde_json::Value>,
    /// Existing transcription this recording appended to, if resuming
    pub resume_of: Option<i64>,
}

/// Request body for PATCH updates. Absent fields are left untouched;
/// a present `content` creates a diff entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub speaker_map: Option<serde_json::Value>,
    #[serde(alias = "metadata")]
    pub extra_metadata: Option<serde_json::Value>,
    pub is_reviewed: Option<bool>,
}

/// Response shape: current content served as `content`.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResponse {
    pub id: i64,
    pub title: Option<String>,
    pub content: String,
    pub audio_file_path: Option<String>,
    pub duration_seconds: Option<f64>,
    pub speaker_map: serde_json::Value,
    #[serde(rename = "metadata")]
    pub extra_metadata: serde_json::Value,
    pub is_reviewed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub current_diff_id: Option<i64>,
}

impl From<Transcription> for TranscriptionResponse {
    fn from(t: Transcription) -> Self {
        Self {
            id: t.id,
            title: t.title,
            content: t.current_content,
            audio_file_path: t.audio_file_path,
            duration_seconds: t.duration_seconds,
            speaker_map: t.speaker_map,
            extra_metadata: t.extra_metadata,
            is_reviewed: t.is_reviewed,
            created_at: t.created_at,
            updated_at: t.updated_at,
            last_modified_at: t.last_modified_at,
            current_diff_id: t.current_diff_id,
        }
    }
}

/// Compact list item for pickers.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionSummary {
    pub id: i64,
    pub title: Option<String>,
    /// First 100 characters of the current content
    pub content_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub modification_count: i64,
}

/// Paginated list envelope.
#[derive(Debug, Serialize)]
pub struct TranscriptionListResponse {
    pub transcriptions: Vec<TranscriptionResponse>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_serves_current_content() {
        let t = Transcription {
            id: 1,
            title: Some("Note".to_string()),
            original_content: "first".to_string(),
            current_content: "edited".to_string(),
            current_diff_id: Some(4),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_modified_at: None,
            audio_file_path: None,
            duration_seconds: Some(9.0),
            speaker_map: serde_json::json!({}),
            extra_metadata: serde_json::json!({}),
            is_reviewed: false,
        };

        let response = TranscriptionResponse::from(t);
        assert_eq!(response.content, "edited");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["content"], "edited");
        assert!(json.get("metadata").is_some());
    }

    #[test]
    fn test_update_accepts_metadata_alias() {
        let update: TranscriptionUpdate =
            serde_json::from_str(r#"{"metadata": {"tag": "work"}}"#).unwrap();
        assert_eq!(update.extra_metadata, Some(serde_json::json!({"tag": "work"})));
        assert!(update.content.is_none());
    }
}
