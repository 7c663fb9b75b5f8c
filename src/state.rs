//! # Application State Management
//!
//! Shared state handed to every HTTP request handler and WebSocket actor.
//! Mutable pieces (config, metrics) sit behind `Arc<RwLock<..>>`; the
//! process-wide resources (transcription engine, store, review gateway) are
//! plain `Arc`s whose types manage their own interior locking.
//!
//! The engine deliberately lives here rather than per connection: the
//! loaded Whisper model is a process-scoped resource shared by all
//! sessions, and swaps are serialized inside the engine itself.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::persistence::TranscriptionStore;
use crate::review::ReviewGateway;
use crate::transcription::TranscriptionEngine;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Request/session metrics, updated by middleware and the WebSocket
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Process-wide transcription engine (one resident model)
    pub engine: Arc<TranscriptionEngine>,

    /// Durable transcription store
    pub store: Arc<TranscriptionStore>,

    /// AI review gateway
    pub review: Arc<ReviewGateway>,

    /// Inference device label for health reporting
    pub device_label: &'static str,

    /// When the server started
    pub start_time: Instant,
}

/// Metrics collected across all HTTP requests and sessions.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of errors encountered since server start
    pub error_count: u64,

    /// Current number of active streaming sessions
    pub active_sessions: u32,

    /// Per-endpoint statistics, keyed like "GET /api/transcriptions"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a specific endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> u64 {
        if self.request_count > 0 {
            self.total_duration_ms / self.request_count
        } else {
            0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

/// Clonable snapshot of the metrics for responses.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

impl AppState {
    /// Build the shared state: open the store, pick the inference device,
    /// and wire up the review gateway.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let device = crate::device::best_device();
        let device_label = crate::device::device_description(&device);
        let store = TranscriptionStore::new(&config.storage.database_path)?;
        let review = ReviewGateway::new(&config.models.review_base_url, &config.models.review_model);

        Ok(Self {
            engine: Arc::new(TranscriptionEngine::new(device)),
            store: Arc::new(store),
            review: Arc::new(review),
            device_label,
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        })
    }

    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn update_config(&self, config: AppConfig) {
        *self.config.write().unwrap() = config;
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record one finished HTTP request for the metrics endpoints.
    pub fn record_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let entry = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();
        entry.request_count += 1;
        entry.total_duration_ms += duration_ms;
        if is_error {
            entry.error_count += 1;
        }
    }

    /// Track a streaming session start; false when the limit is reached.
    pub fn try_begin_session(&self) -> bool {
        let limit = self.get_config().performance.max_concurrent_sessions as u32;
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions >= limit {
            return false;
        }
        metrics.active_sessions += 1;
        true
    }

    pub fn end_session(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
    }

    pub fn get_metrics_snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().unwrap();
        MetricsSnapshot {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_sessions = 2;

        AppState {
            engine: Arc::new(TranscriptionEngine::new(candle_core::Device::Cpu)),
            store: Arc::new(TranscriptionStore::in_memory().unwrap()),
            review: Arc::new(ReviewGateway::new("http://127.0.0.1:9", "test")),
            device_label: "cpu",
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    #[test]
    fn test_request_metrics() {
        let state = test_state();
        state.record_request("GET /health", 5, false);
        state.record_request("GET /health", 15, true);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);

        let endpoint = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(endpoint.average_duration_ms(), 10);
        assert_eq!(endpoint.error_rate(), 0.5);
    }

    #[test]
    fn test_session_limit() {
        let state = test_state();
        assert!(state.try_begin_session());
        assert!(state.try_begin_session());
        assert!(!state.try_begin_session());

        state.end_session();
        assert!(state.try_begin_session());
    }
}
