//! # Model Management Endpoints
//!
//! HTTP surface for the shared transcription engine: list the available
//! Whisper sizes with residency status, preload a model ahead of a
//! streaming session, or drop the resident one.

use crate::error::AppError;
use crate::state::AppState;
use crate::transcription::ModelSize;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

const ALL_SIZES: [ModelSize; 5] = [
    ModelSize::Tiny,
    ModelSize::Base,
    ModelSize::Small,
    ModelSize::Medium,
    ModelSize::Large,
];

/// Request body for loading a specific model.
#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    /// Model size to load (tiny, base, small, medium, large)
    pub model_size: String,
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub size: String,
    pub description: String,
    pub size_mb: u32,
    pub loaded: bool,
}

/// `GET /api/models/whisper` - available models and residency status.
pub async fn list_whisper_models(
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let current = app_state.engine.current_model().await;

    let models: Vec<ModelInfoResponse> = ALL_SIZES
        .iter()
        .map(|&size| ModelInfoResponse {
            size: size.to_string(),
            description: size.description().to_string(),
            size_mb: size.size_mb(),
            loaded: current == Some(size),
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "models": models,
        "current_loaded": current.map(|size| size.to_string()),
        "memory_usage_mb": app_state.engine.memory_usage_bytes().await / (1024 * 1024),
    })))
}

/// `POST /api/models/whisper/load` - preload a model into the shared engine.
///
/// Progress goes to the log; streaming clients get their progress events
/// over the WebSocket instead.
pub async fn load_whisper_model(
    app_state: web::Data<AppState>,
    request: web::Json<LoadModelRequest>,
) -> Result<HttpResponse, AppError> {
    let start_time = std::time::Instant::now();

    let model_size: ModelSize = request
        .model_size
        .parse()
        .map_err(|e| AppError::ValidationError(format!("Invalid model size: {}", e)))?;

    app_state
        .engine
        .ensure_loaded(model_size, |progress| {
            tracing::debug!("Model load progress: {:?}", progress);
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Model loaded successfully",
        "model_size": model_size.to_string(),
        "load_time_seconds": start_time.elapsed().as_secs_f64(),
    })))
}

/// `POST /api/models/whisper/unload` - drop the resident model.
pub async fn unload_whisper_model(
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    app_state.engine.unload().await;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Model unloaded",
    })))
}
