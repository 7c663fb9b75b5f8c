//! # Transcription Module
//!
//! Speech-to-text via Whisper models running on Candle-rs - a pure Rust
//! inference path with no FFI bindings to whisper.cpp.
//!
//! ## Key Components:
//! - **Model**: downloading, loading, and decoding with a Whisper checkpoint
//! - **Engine**: the process-wide model cache shared by every session, with
//!   idempotent loading, progress reporting, and serialized model swaps
//!
//! The engine is consumed through the [`SpeechToText`] trait so the
//! streaming state machine can be exercised without a real model.

pub mod engine;
pub mod model;

use serde::{Deserialize, Serialize};

pub use engine::{LoadProgress, SpeechToText, TranscriptionEngine};
pub use model::ModelSize;

/// One timed span of transcribed speech.
///
/// Times are seconds from the start of the audio the engine was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// Join segment texts into a single transcript string.
pub fn segments_to_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_to_text_skips_blank() {
        let segments = vec![
            TranscriptSegment::new(" hello ", 0.0, 1.0),
            TranscriptSegment::new("", 1.0, 2.0),
            TranscriptSegment::new("world", 2.0, 3.0),
        ];
        assert_eq!(segments_to_text(&segments), "hello world");
    }
}
