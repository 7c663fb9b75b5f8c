//! # Transcription REST Handlers
//!
//! CRUD over the persistence store, the soft-delete/restore pair, the
//! synchronous file-transcription endpoint, the AI review endpoint, and
//! artifact serving. Handlers route and validate; the atomicity guarantees
//! live in the store.

use crate::audio::chunk;
use crate::error::AppError;
use crate::persistence::models::{
    TranscriptionCreate, TranscriptionListResponse, TranscriptionResponse, TranscriptionUpdate,
};
use crate::persistence::SaveArtifact;
use crate::review::ReviewAction;
use crate::state::AppState;
use crate::transcription::segments_to_text;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt as _;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub text: String,
    pub action: String,
}

/// `GET /api/transcriptions` - paginated, newest first.
pub async fn list_transcriptions(
    app_state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let (rows, total) = app_state.store.list(query.page, query.page_size)?;

    Ok(HttpResponse::Ok().json(TranscriptionListResponse {
        transcriptions: rows.into_iter().map(TranscriptionResponse::from).collect(),
        total,
        page: query.page.max(1),
        page_size: query.page_size.clamp(1, 100),
    }))
}

/// `GET /api/transcriptions/summaries` - compact list for pickers.
pub async fn list_summaries(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(app_state.store.summaries()?))
}

/// `GET /api/transcriptions/deleted` - the soft-delete shadow rows.
pub async fn list_deleted(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(app_state.store.list_deleted()?))
}

/// `GET /api/transcriptions/{id}`
pub async fn get_transcription(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let transcription = app_state.store.get(path.into_inner())?;
    Ok(HttpResponse::Ok().json(TranscriptionResponse::from(transcription)))
}

/// `POST /api/transcriptions` - persist a finished recording.
///
/// With `resume_of` set this updates the prior transcription additively
/// (combined duration, authoritative text). A missing title is filled in
/// best-effort by the review gateway; its failure never blocks the save.
pub async fn create_transcription(
    app_state: web::Data<AppState>,
    data: web::Json<TranscriptionCreate>,
) -> Result<HttpResponse, AppError> {
    let data = data.into_inner();

    let title = match &data.title {
        Some(title) => Some(title.clone()),
        None => match app_state.review.suggest_title(&data.content).await {
            Ok(title) if !title.is_empty() => Some(title),
            Ok(_) | Err(_) => {
                // Review unavailable or empty answer; fall back to a
                // timestamp label
                Some(format!(
                    "Recording {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M")
                ))
            }
        },
    };

    let artifact = SaveArtifact {
        title,
        text: data.content,
        audio_file_path: data.audio_file_path,
        duration_seconds: data.duration_seconds,
        speaker_map: data.speaker_map.unwrap_or_else(|| json!({})),
        extra_metadata: data.extra_metadata.unwrap_or_else(|| json!({})),
        resume_of: data.resume_of,
    };

    let saved = app_state.store.save(artifact)?;
    info!("Saved transcription {}", saved.id);

    Ok(HttpResponse::Created().json(TranscriptionResponse::from(saved)))
}

/// `PATCH /api/transcriptions/{id}` - partial update with diff tracking.
pub async fn update_transcription(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
    data: web::Json<TranscriptionUpdate>,
) -> Result<HttpResponse, AppError> {
    let updated = app_state.store.edit(path.into_inner(), data.into_inner())?;
    Ok(HttpResponse::Ok().json(TranscriptionResponse::from(updated)))
}

/// `DELETE /api/transcriptions/{id}` - soft delete.
pub async fn delete_transcription(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
    query: web::Query<DeleteQuery>,
) -> Result<HttpResponse, AppError> {
    app_state
        .store
        .delete(path.into_inner(), query.reason.as_deref())?;
    Ok(HttpResponse::NoContent().finish())
}

/// `POST /api/transcriptions/{id}/restore` - move the shadow row back.
pub async fn restore_transcription(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let restored = app_state.store.restore(path.into_inner())?;
    Ok(HttpResponse::Ok().json(TranscriptionResponse::from(restored)))
}

/// `GET /api/transcriptions/{id}/history` - diff entries in edit order.
pub async fn get_history(
    app_state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(app_state.store.history(path.into_inner())?))
}

/// `POST /api/transcriptions/transcribe` - synchronous one-shot
/// transcription of an uploaded WAV file, bypassing the streaming path.
/// Used to re-verify a full recording.
pub async fn transcribe_file(
    app_state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut file_bytes: Vec<u8> = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("Invalid multipart payload: {}", e)))?;

        if field.name() != Some("file") {
            continue;
        }

        while let Some(bytes) = field.next().await {
            let bytes = bytes
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
            file_bytes.extend_from_slice(&bytes);
        }
    }

    if file_bytes.is_empty() {
        return Err(AppError::BadRequest(
            "Multipart field 'file' with audio content is required".to_string(),
        ));
    }

    let config = app_state.get_config();
    let audio_path = config
        .storage
        .audio_dir
        .join(format!("{}_upload.wav", Uuid::new_v4()));
    std::fs::create_dir_all(&config.storage.audio_dir)?;
    std::fs::write(&audio_path, &file_bytes)?;

    let (samples, sample_rate) = chunk::read_wav(&audio_path)?;
    if sample_rate != config.audio.sample_rate {
        return Err(AppError::CorruptAudio(format!(
            "Expected {} Hz audio, got {} Hz",
            config.audio.sample_rate, sample_rate
        )));
    }

    // A one-shot caller may arrive before any session loaded a model
    let default_model = config
        .models
        .whisper_model
        .parse()
        .map_err(|e| AppError::ConfigError(format!("{}", e)))?;
    app_state
        .engine
        .ensure_loaded(default_model, |progress| {
            tracing::debug!("Model load progress: {:?}", progress);
        })
        .await?;

    let floats = crate::audio::processor::pcm_to_float(&samples);
    let segments = {
        use crate::transcription::SpeechToText as _;
        app_state.engine.transcribe(&floats, None).await?
    };

    let duration = samples.len() as f64 / sample_rate as f64;
    let text = segments_to_text(&segments);
    let audio_url = audio_path
        .file_name()
        .map(|name| format!("/api/audio/{}", name.to_string_lossy()));

    Ok(HttpResponse::Ok().json(json!({
        "segments": segments,
        "text": text,
        "audio_path": audio_url,
        "duration": duration,
    })))
}

/// `POST /api/review` - apply an AI text transformation.
///
/// 503 when the review service is down; persistence callers treat that as
/// non-fatal, direct callers see the error.
pub async fn review_text(
    app_state: web::Data<AppState>,
    data: web::Json<ReviewRequest>,
) -> Result<HttpResponse, AppError> {
    let action: ReviewAction = data.action.parse()?;
    let result = app_state.review.review(&data.text, action).await?;

    Ok(HttpResponse::Ok().json(json!({
        "original": data.text,
        "result": result,
        "action": action.as_str(),
    })))
}

/// `GET /api/audio/{filename}` - serve a finalized WAV artifact.
pub async fn serve_audio(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let filename = path.into_inner();
    if filename.contains("..") || filename.contains('/') {
        return Err(AppError::BadRequest(format!(
            "Invalid audio filename: {}",
            filename
        )));
    }

    let config = app_state.get_config();
    let full_path = config.storage.audio_dir.join(&filename);
    if !full_path.exists() {
        return Err(AppError::NotFound(format!(
            "Audio file not found: {}",
            filename
        )));
    }

    let bytes = std::fs::read(&full_path).map_err(|e| {
        warn!("Failed to read audio artifact {:?}: {}", full_path, e);
        AppError::Internal(format!("Cannot read audio file: {}", e))
    })?;

    Ok(HttpResponse::Ok().content_type("audio/wav").body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query: ListQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 20);
    }

    #[test]
    fn test_review_request_parsing() {
        let request: ReviewRequest =
            serde_json::from_str(r#"{"text": "helo", "action": "fix_grammar"}"#).unwrap();
        assert_eq!(request.action, "fix_grammar");
        assert!(request.action.parse::<ReviewAction>().is_ok());
    }
}
