//! # Audio Pipeline Module
//!
//! Handles the audio half of the streaming pipeline: raw PCM fragments
//! arriving over the WebSocket are validated, accumulated per session, and
//! muxed into WAV artifacts when a recording ends.
//!
//! ## Key Components:
//! - **Chunk Buffer**: ordered fragment accumulation, finalization, and
//!   resume concatenation
//! - **Processor**: PCM validation, channel extraction, format conversion
//!
//! ## Wire Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM, little-endian signed integers
//! - **Channels**: 1 (single) or 2 interleaved (left/right/both modes)
//!
//! Fragments are raw PCM frames, so any fragment boundary is a safe splice
//! point; the WAV container is written exactly once, at finalization.
//! Stored artifacts are always mono - channel selection is applied before
//! the mux.

pub mod chunk;      // Per-session fragment accumulation and finalization
pub mod processor;  // PCM validation, channel mixdown, i16 <-> f32
