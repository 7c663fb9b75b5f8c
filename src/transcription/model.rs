//! # Whisper Model Management
//!
//! Handles downloading, loading, and running Whisper checkpoints with
//! Candle-rs.
//!
//! ## Model Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load model weights and tokenizer
//! 3. Initialize model on the selected device (CPU/GPU)
//! 4. Validate the model with a short silent input
//!
//! Audio longer than Whisper's 30-second context is decoded window by
//! window; each non-empty window becomes one timed segment.

use crate::transcription::TranscriptSegment;
use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;

/// Whisper's native context length in samples (30s at 16kHz).
const WINDOW_SAMPLES: usize = 30 * 16_000;

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate checkpoint size in MB.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "Fastest, basic accuracy",
            ModelSize::Base => "Fast, good for testing",
            ModelSize::Small => "Balanced speed and accuracy",
            ModelSize::Medium => "Good accuracy, handles technical vocabulary",
            ModelSize::Large => "Best accuracy, slower processing",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        // Accept both bare sizes and full repo-style names
        // (e.g. "openai/whisper-base" or "whisper-base")
        let normalized = s
            .rsplit('/')
            .next()
            .unwrap_or(s)
            .trim_start_matches("whisper-")
            .to_lowercase();

        match normalized.as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" | "large-v2" | "large-v3" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper model ready for transcription.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    size: ModelSize,
    tokenizer: Tokenizer,
}

impl WhisperModel {
    /// Download (cached) and load a Whisper checkpoint from HuggingFace.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let api = {
            use hf_hub::api::tokio::ApiBuilder;

            let mut builder = ApiBuilder::new().with_progress(false);
            builder = builder.with_token(std::env::var("HF_TOKEN").ok());
            if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
                builder = builder.with_cache_dir(cache_dir.into());
            }
            builder
                .build()
                .map_err(|e| anyhow!("Failed to initialize HuggingFace API: {}", e))?
        };

        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        let mut whisper = Self {
            model,
            config,
            device,
            size,
            tokenizer,
        };
        whisper.validate()?;

        Ok(whisper)
    }

    pub fn size(&self) -> ModelSize {
        self.size
    }

    /// Estimated resident memory of the loaded weights in bytes.
    pub fn estimated_memory_usage(&self) -> usize {
        self.size.size_mb() as usize * 1024 * 1024
    }

    /// Transcribe mono 16kHz float samples into timed segments.
    ///
    /// The audio is processed in 30-second windows; each window that decodes
    /// to non-empty text yields one segment whose start/end are the window
    /// bounds within the input.
    pub fn transcribe(
        &mut self,
        audio_data: &[f32],
        language: Option<&str>,
    ) -> Result<Vec<TranscriptSegment>> {
        if audio_data.is_empty() {
            return Ok(Vec::new());
        }

        let start_time = std::time::Instant::now();
        let mut segments = Vec::new();

        for (index, window) in audio_data.chunks(WINDOW_SAMPLES).enumerate() {
            let window_start = (index * WINDOW_SAMPLES) as f64 / 16_000.0;
            let window_end = window_start + window.len() as f64 / 16_000.0;

            let text = self.decode_window(window, language)?;
            if text.is_empty() {
                continue;
            }

            segments.push(TranscriptSegment::new(text, window_start, window_end));
        }

        tracing::debug!(
            "Transcribed {:.2}s of audio into {} segments in {:.2}s",
            audio_data.len() as f64 / 16_000.0,
            segments.len(),
            start_time.elapsed().as_secs_f64()
        );

        Ok(segments)
    }

    /// Run the encoder/decoder over one <=30s window.
    fn decode_window(&mut self, window: &[f32], language: Option<&str>) -> Result<String> {
        let mel = self.pcm_to_mel(window)?;
        let mel = mel.unsqueeze(0)?;

        let encoder_output = self.model.encoder.forward(&mel, false)?;

        let mut prefix = vec![self.sot_token()];
        if let Some(lang) = language {
            if let Some(lang_token) = self.language_token(lang) {
                prefix.push(lang_token);
            }
        }
        prefix.push(self.transcribe_token());
        let prefix_len = prefix.len();

        const MAX_TOKENS: usize = 224;
        const TEMPERATURES: &[f32] = &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

        let mut tokens = prefix.clone();
        let mut output_tokens = Vec::new();

        // Greedy decode with temperature fallback on repetitive output
        for &temperature in TEMPERATURES {
            tokens.truncate(prefix_len);
            output_tokens.clear();

            let mut decode_success = true;

            for _ in 0..MAX_TOKENS {
                let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
                let logits = self
                    .model
                    .decoder
                    .forward(&token_tensor, &encoder_output, false)?;
                let last_logits = logits.i((.., tokens.len() - 1, ..))?;

                let next_token = if temperature > 0.0 {
                    self.sample_token(&last_logits, temperature)?
                } else {
                    last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?
                };

                if next_token == self.eot_token() {
                    break;
                }

                if is_repetitive(&output_tokens, next_token) {
                    decode_success = false;
                    break;
                }

                tokens.push(next_token);
                output_tokens.push(next_token);
            }

            if decode_success {
                break;
            }
        }

        self.decode_tokens(&output_tokens)
    }

    /// Convert PCM audio to a log-mel spectrogram tensor.
    ///
    /// Simplified energy-based features; a window is always padded to the
    /// full 30s / 3000-frame shape the encoder expects.
    fn pcm_to_mel(&self, pcm_data: &[f32]) -> Result<Tensor> {
        let mut padded = vec![0.0f32; WINDOW_SAMPLES];
        let copy_len = pcm_data.len().min(WINDOW_SAMPLES);
        padded[..copy_len].copy_from_slice(&pcm_data[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let n_frames = 3000;
        let frame_size = padded.len() / n_frames;

        let mut mel_data = vec![0.0f32; n_mels * n_frames];
        for frame in 0..n_frames {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());

            let mut energy = 0.0f32;
            for sample in &padded[start..end] {
                energy += sample.abs();
            }
            let value = (energy / frame_size as f32).ln().max(-11.5129); // -80 dB floor

            for mel_bin in 0..n_mels {
                mel_data[mel_bin * n_frames + frame] = value;
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, n_frames), &self.device)?)
    }

    /// Run a short silent input through the model after loading.
    fn validate(&mut self) -> Result<()> {
        let test_audio = vec![0.0f32; 16_000];
        let _ = self.decode_window(&test_audio, Some("en"))?;
        tracing::debug!("Whisper {} model validated", self.size);
        Ok(())
    }

    fn sot_token(&self) -> u32 {
        50258
    }

    fn eot_token(&self) -> u32 {
        50257
    }

    fn transcribe_token(&self) -> u32 {
        50359
    }

    fn language_token(&self, language: &str) -> Option<u32> {
        match language.to_lowercase().as_str() {
            "en" | "english" => Some(50259),
            "zh" | "chinese" => Some(50260),
            "de" | "german" => Some(50261),
            "es" | "spanish" => Some(50262),
            "ru" | "russian" => Some(50263),
            "ko" | "korean" => Some(50264),
            "fr" | "french" => Some(50265),
            "ja" | "japanese" => Some(50266),
            "pt" | "portuguese" => Some(50267),
            "it" | "italian" => Some(50274),
            _ => None,
        }
    }

    fn sample_token(&self, logits: &Tensor, temperature: f32) -> Result<u32> {
        let temp_tensor = Tensor::from_vec(vec![temperature], (1,), &self.device)?;
        let logits = logits.broadcast_div(&temp_tensor)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits)?;
        let token = probs.argmax_keepdim(1)?.to_scalar::<u32>()?;
        Ok(token)
    }

    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

/// Detect immediate or pattern token repetition in the decoder output.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() >= 2 {
        let tail = &tokens[tokens.len() - 2..];
        if tail == [new_token, new_token] {
            return true;
        }
    }

    if tokens.len() >= 6 {
        let last_3 = &tokens[tokens.len() - 3..];
        let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
        if last_3 == prev_3 {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("medium".parse::<ModelSize>().unwrap(), ModelSize::Medium);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert_eq!(
            "openai/whisper-base".parse::<ModelSize>().unwrap(),
            ModelSize::Base
        );
        assert_eq!("whisper-tiny".parse::<ModelSize>().unwrap(), ModelSize::Tiny);
        assert!("invalid".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_metadata() {
        assert_eq!(ModelSize::Medium.size_mb(), 769);
        assert_eq!(ModelSize::Base.repo_name(), "openai/whisper-base");
        assert_eq!(ModelSize::Tiny.to_string(), "tiny");
    }

    #[test]
    fn test_repetition_detection() {
        assert!(is_repetitive(&[5, 7, 7], 7));
        assert!(is_repetitive(&[1, 2, 3, 1, 2, 3], 9)); // pattern repeat
        assert!(!is_repetitive(&[1, 2, 3], 4));
        assert!(!is_repetitive(&[], 1));
    }
}
