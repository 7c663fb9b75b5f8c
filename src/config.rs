//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_AUDIO_SAMPLE_RATE, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub audio: AudioSettings,
    pub storage: StorageConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// `host = "127.0.0.1"` accepts localhost only; `0.0.0.0` accepts any origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// AI model configuration settings.
///
/// ## Fields:
/// - `whisper_model`: default Whisper size loaded when a session does not
///   pick one ("tiny", "base", "small", "medium", "large")
/// - `review_model`: Ollama model used for text review and title suggestions
/// - `review_base_url`: Ollama server base URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub review_model: String,
    pub review_base_url: String,
}

/// Streaming audio settings.
///
/// ## Fields:
/// - `sample_rate`/`bit_depth`: expected wire format (16 kHz, 16-bit PCM)
/// - `transcribe_interval_secs`: seconds of new audio that trigger an
///   inference pass over the accumulated session audio
/// - `min_transcribe_secs`: minimum accumulated audio before the first pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub bit_depth: u8,
    pub transcribe_interval_secs: f64,
    pub min_transcribe_secs: f64,
}

/// Filesystem and database locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory where finalized WAV artifacts are written
    pub audio_dir: PathBuf,
    /// SQLite database file
    pub database_path: PathBuf,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of concurrent streaming sessions
    pub max_concurrent_sessions: usize,
    /// Memory budget for the resident Whisper model
    pub max_model_memory_mb: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                whisper_model: "base".to_string(),
                review_model: "llama3.1:8b".to_string(),
                review_base_url: "http://localhost:11434".to_string(),
            },
            audio: AudioSettings {
                sample_rate: 16_000,
                bit_depth: 16,
                transcribe_interval_secs: 3.0,
                min_transcribe_secs: 1.0,
            },
            storage: StorageConfig {
                audio_dir: PathBuf::from("audio"),
                database_path: PathBuf::from("whisper_notes.db"),
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
                max_model_memory_mb: 2048,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and environment.
    ///
    /// `HOST`/`PORT` are honored without the `APP_` prefix because
    /// deployment platforms commonly set them directly.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.bit_depth != 16 {
            return Err(anyhow::anyhow!(
                "Only 16-bit PCM is supported, got {} bits",
                self.audio.bit_depth
            ));
        }

        if self.audio.transcribe_interval_secs <= 0.0 {
            return Err(anyhow::anyhow!("Transcribe interval must be positive"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime config updates).
    ///
    /// Accepts partial documents: only the provided fields are changed, and
    /// the result is re-validated before taking effect.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(models) = partial.get("models") {
            if let Some(whisper) = models.get("whisper_model").and_then(|v| v.as_str()) {
                self.models.whisper_model = whisper.to_string();
            }
            if let Some(review) = models.get("review_model").and_then(|v| v.as_str()) {
                self.models.review_model = review.to_string();
            }
            if let Some(url) = models.get("review_base_url").and_then(|v| v.as_str()) {
                self.models.review_base_url = url.to_string();
            }
        }

        if let Some(audio) = partial.get("audio") {
            if let Some(interval) = audio
                .get("transcribe_interval_secs")
                .and_then(|v| v.as_f64())
            {
                self.audio.transcribe_interval_secs = interval;
            }
            if let Some(min) = audio.get("min_transcribe_secs").and_then(|v| v.as_f64()) {
                self.audio.min_transcribe_secs = min;
            }
        }

        if let Some(performance) = partial.get("performance") {
            if let Some(sessions) = performance
                .get("max_concurrent_sessions")
                .and_then(|v| v.as_u64())
            {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
            if let Some(memory) = performance.get("max_model_memory_mb").and_then(|v| v.as_u64()) {
                self.performance.max_model_memory_mb = memory as u32;
            }
        }

        self.validate()?;
        Ok(())
    }
}
