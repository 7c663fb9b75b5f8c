//! # Audio Processing and Validation
//!
//! PCM validation and conversion for the streaming pipeline. Incoming
//! fragments are checked against the configured wire format before they are
//! buffered, and interleaved stereo is reduced to mono according to the
//! session's channel mode before transcription or storage.

use crate::error::{AppError, AppResult};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Which part of the incoming signal a session transcribes.
///
/// `single` declares a mono wire; the other modes declare interleaved
/// stereo and select how it is reduced to the mono signal the model and the
/// stored artifact use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Single,
    Left,
    Right,
    Both,
}

impl ChannelMode {
    /// Number of interleaved channels this mode expects on the wire.
    pub fn wire_channels(&self) -> u16 {
        match self {
            ChannelMode::Single => 1,
            ChannelMode::Left | ChannelMode::Right | ChannelMode::Both => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Single => "single",
            ChannelMode::Left => "left",
            ChannelMode::Right => "right",
            ChannelMode::Both => "both",
        }
    }
}

impl std::str::FromStr for ChannelMode {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.to_lowercase().as_str() {
            "single" | "mono" => Ok(ChannelMode::Single),
            "left" => Ok(ChannelMode::Left),
            "right" => Ok(ChannelMode::Right),
            "both" | "stereo" => Ok(ChannelMode::Both),
            other => Err(AppError::ValidationError(format!(
                "Unknown channel mode: {}",
                other
            ))),
        }
    }
}

impl Default for ChannelMode {
    fn default() -> Self {
        ChannelMode::Both
    }
}

/// Validate that a fragment is well-formed PCM for the given channel mode.
///
/// ## Checks:
/// - non-empty payload
/// - whole 16-bit samples (even byte count)
/// - whole frames (sample count divisible by the channel count)
pub fn validate_fragment(data: &[u8], mode: ChannelMode) -> AppResult<()> {
    if data.is_empty() {
        return Err(AppError::ValidationError("Audio fragment is empty".to_string()));
    }

    if data.len() % 2 != 0 {
        return Err(AppError::ValidationError(
            "Audio fragment length must be even for 16-bit samples".to_string(),
        ));
    }

    let frame_bytes = 2 * mode.wire_channels() as usize;
    if data.len() % frame_bytes != 0 {
        return Err(AppError::ValidationError(format!(
            "Audio fragment of {} bytes does not contain whole {}-channel frames",
            data.len(),
            mode.wire_channels()
        )));
    }

    Ok(())
}

/// Decode little-endian 16-bit PCM bytes into samples.
pub fn decode_pcm(data: &[u8]) -> AppResult<Vec<i16>> {
    if data.len() % 2 != 0 {
        return Err(AppError::CorruptAudio(
            "PCM byte length is not a whole number of 16-bit samples".to_string(),
        ));
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    Ok(samples)
}

/// Reduce interleaved samples to mono according to the channel mode.
///
/// `Single` passes the signal through; `Left`/`Right` pick one side of the
/// interleaved stream; `Both` averages the pair. Frames are interleaved
/// L,R,L,R,...
pub fn mixdown(samples: &[i16], mode: ChannelMode) -> Vec<i16> {
    match mode {
        ChannelMode::Single => samples.to_vec(),
        ChannelMode::Left => samples.iter().copied().step_by(2).collect(),
        ChannelMode::Right => samples.iter().copied().skip(1).step_by(2).collect(),
        ChannelMode::Both => samples
            .chunks_exact(2)
            .map(|pair| (((pair[0] as i32) + (pair[1] as i32)) / 2) as i16)
            .collect(),
    }
}

/// Convert 16-bit PCM samples to the float range Whisper expects.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}
