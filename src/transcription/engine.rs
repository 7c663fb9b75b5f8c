//! # Transcription Engine
//!
//! Process-wide owner of the loaded Whisper model. Every streaming session
//! and REST handler shares one engine; exactly one model is resident at a
//! time and model swaps are serialized so a `set_model` from one session
//! can never corrupt another session's in-flight inference.
//!
//! ## Loading:
//! `ensure_loaded` is idempotent - if the requested model is already
//! resident it returns immediately. Otherwise the download/load runs behind
//! the swap lock while progress events (downloading heartbeats, ready) are
//! pushed to the caller, because a cold load can take minutes and must not
//! look like a hang.

use crate::error::{AppError, AppResult};
use crate::transcription::model::{ModelSize, WhisperModel};
use crate::transcription::TranscriptSegment;
use async_trait::async_trait;
use candle_core::Device;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Progress events emitted while a model loads.
#[derive(Debug, Clone)]
pub enum LoadProgress {
    /// Checkpoint files are being fetched from the hub
    Downloading { elapsed_seconds: u64 },
    /// Files are local, weights are being initialized
    Loading { model: ModelSize },
    /// The model is resident and validated
    Ready { model: ModelSize },
}

/// The seam between the streaming pipeline and the speech model.
///
/// Sessions depend on this trait rather than on the engine so the state
/// machine can be tested against a scripted transcriber.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Make `size` the model answering `transcribe` calls, reporting
    /// progress while the load runs. Idempotent for the resident model.
    async fn ensure_model(
        &self,
        size: ModelSize,
        progress: Box<dyn Fn(LoadProgress) + Send + Sync>,
    ) -> AppResult<()>;

    /// Transcribe mono 16kHz samples into ordered timed segments.
    ///
    /// Tolerates repeated calls over growing prefixes of the same audio;
    /// each call is independent from the caller's perspective.
    async fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
    ) -> AppResult<Vec<TranscriptSegment>>;
}

#[derive(Debug, Default)]
struct EngineMetrics {
    total_requests: u64,
    failed_requests: u64,
    total_audio_seconds: f64,
    total_processing_ms: u64,
}

/// Shared transcription engine holding the resident model.
pub struct TranscriptionEngine {
    /// The resident model; write access both for swaps and for inference
    /// (the decoder mutates its key/value caches)
    model: RwLock<Option<WhisperModel>>,
    /// Serializes load/unload so concurrent swap requests queue up
    swap_lock: Mutex<()>,
    device: Device,
    metrics: RwLock<EngineMetrics>,
}

impl TranscriptionEngine {
    pub fn new(device: Device) -> Self {
        Self {
            model: RwLock::new(None),
            swap_lock: Mutex::new(()),
            device,
            metrics: RwLock::new(EngineMetrics::default()),
        }
    }

    /// Make sure `size` is the resident model, loading or swapping if not.
    ///
    /// Progress is pushed through `progress` - a downloading heartbeat
    /// roughly every 3 seconds while the hub fetch runs, then `Ready`.
    /// Idempotent: a request for the already-resident model returns after
    /// emitting `Ready`.
    pub async fn ensure_loaded<F>(&self, size: ModelSize, progress: F) -> AppResult<()>
    where
        F: Fn(LoadProgress) + Send + Sync + 'static,
    {
        if self.current_model().await == Some(size) {
            progress(LoadProgress::Ready { model: size });
            return Ok(());
        }

        let _swap = self.swap_lock.lock().await;

        // A competing request may have finished the load while we queued
        if self.current_model().await == Some(size) {
            progress(LoadProgress::Ready { model: size });
            return Ok(());
        }

        if let Some(previous) = self.current_model().await {
            info!("Swapping resident model {} -> {}", previous, size);
        }

        let progress = Arc::new(progress);
        let heartbeat = {
            let progress = progress.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let mut ticker = tokio::time::interval(Duration::from_secs(3));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    progress(LoadProgress::Downloading {
                        elapsed_seconds: started.elapsed().as_secs(),
                    });
                }
            })
        };

        let load_result = WhisperModel::load(size, self.device.clone()).await;
        heartbeat.abort();

        let new_model = load_result.map_err(|e| AppError::ModelLoad(e.to_string()))?;
        progress(LoadProgress::Loading { model: size });

        {
            let mut guard = self.model.write().await;
            *guard = Some(new_model);
        }

        progress(LoadProgress::Ready { model: size });
        Ok(())
    }

    /// Drop the resident model to free memory.
    pub async fn unload(&self) {
        let _swap = self.swap_lock.lock().await;
        let mut guard = self.model.write().await;
        if let Some(model) = guard.take() {
            info!("Unloaded Whisper {} model", model.size());
        }
    }

    pub async fn current_model(&self) -> Option<ModelSize> {
        self.model.read().await.as_ref().map(|m| m.size())
    }

    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Resident model memory in bytes, zero when nothing is loaded.
    pub async fn memory_usage_bytes(&self) -> usize {
        self.model
            .read()
            .await
            .as_ref()
            .map(|m| m.estimated_memory_usage())
            .unwrap_or(0)
    }

    pub async fn stats(&self) -> EngineStats {
        let metrics = self.metrics.read().await;
        EngineStats {
            total_requests: metrics.total_requests,
            failed_requests: metrics.failed_requests,
            total_audio_seconds: metrics.total_audio_seconds,
            average_processing_ms: if metrics.total_requests > 0 {
                metrics.total_processing_ms / metrics.total_requests
            } else {
                0
            },
        }
    }
}

#[async_trait]
impl SpeechToText for TranscriptionEngine {
    async fn ensure_model(
        &self,
        size: ModelSize,
        progress: Box<dyn Fn(LoadProgress) + Send + Sync>,
    ) -> AppResult<()> {
        self.ensure_loaded(size, move |event| progress(event)).await
    }

    async fn transcribe(
        &self,
        samples: &[f32],
        language: Option<&str>,
    ) -> AppResult<Vec<TranscriptSegment>> {
        let started = Instant::now();
        let audio_seconds = samples.len() as f64 / 16_000.0;

        let result = {
            let mut guard = self.model.write().await;
            match guard.as_mut() {
                Some(model) => model
                    .transcribe(samples, language)
                    .map_err(|e| AppError::Inference(e.to_string())),
                None => Err(AppError::ModelLoad(
                    "No model loaded for transcription".to_string(),
                )),
            }
        };

        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        metrics.total_audio_seconds += audio_seconds;
        metrics.total_processing_ms += started.elapsed().as_millis() as u64;
        if result.is_err() {
            metrics.failed_requests += 1;
            warn!(
                "Transcription of {:.2}s audio failed: {:?}",
                audio_seconds,
                result.as_ref().err()
            );
        }

        result
    }
}

/// Snapshot of engine throughput counters.
#[derive(Debug, serde::Serialize)]
pub struct EngineStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_audio_seconds: f64,
    pub average_processing_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_engine_starts_empty() {
        let engine = TranscriptionEngine::new(Device::Cpu);
        assert!(!engine.is_loaded().await);
        assert_eq!(engine.current_model().await, None);
        assert_eq!(engine.memory_usage_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_transcribe_without_model_is_model_error() {
        let engine = TranscriptionEngine::new(Device::Cpu);
        let result = engine.transcribe(&[0.0f32; 160], None).await;
        match result {
            Err(AppError::ModelLoad(_)) => {}
            other => panic!("Expected ModelLoad error, got {:?}", other),
        }

        let stats = engine.stats().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.failed_requests, 1);
    }
}
