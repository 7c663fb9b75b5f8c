//! # Audio Chunk Buffer
//!
//! Accumulates the raw PCM fragments a streaming session receives and turns
//! them into a playable WAV artifact when the recording ends. Fragments are
//! kept in exact arrival order and are never re-ordered or evicted; the
//! container is written once, at finalization.
//!
//! ## Resumed Recordings:
//! `concatenate_with_prior` splices a previously saved artifact in front of
//! the new session's audio. The prior WAV is demuxed back to samples, the
//! new samples are appended, and the combined signal is re-muxed onto the
//! prior artifact's path so saved transcriptions keep pointing at the same
//! file. Duration is computed from the combined sample count, which makes
//! it exactly additive.

use crate::audio::processor::{self, ChannelMode};
use crate::error::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A finalized, decodable audio artifact.
///
/// Carries the mono samples alongside the path so the finalization pipeline
/// can run the authoritative transcription pass without re-reading the file.
#[derive(Debug, Clone)]
pub struct AudioArtifact {
    /// Path of the WAV file on disk
    pub path: PathBuf,
    /// Playback duration derived from the sample count
    pub duration_seconds: f64,
    /// Mono 16-bit samples the artifact was muxed from
    pub samples: Vec<i16>,
}

/// Per-session accumulator for encoded audio fragments.
pub struct AudioChunkBuffer {
    session_id: String,
    audio_dir: PathBuf,
    sample_rate: u32,
    mode: ChannelMode,
    /// Fragments in exact arrival order; decoded only at finalization
    fragments: Vec<Vec<u8>>,
    total_bytes: usize,
}

impl AudioChunkBuffer {
    pub fn new(session_id: &str, audio_dir: PathBuf, sample_rate: u32, mode: ChannelMode) -> Self {
        Self {
            session_id: session_id.to_string(),
            audio_dir,
            sample_rate,
            mode,
            fragments: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Switch the channel mode before any audio has arrived.
    ///
    /// The mode fixes the wire frame size, so it cannot change once
    /// fragments are buffered.
    pub fn set_channel_mode(&mut self, mode: ChannelMode) -> AppResult<()> {
        if !self.fragments.is_empty() {
            return Err(AppError::ValidationError(
                "Cannot change channel mode after audio has been received".to_string(),
            ));
        }
        self.mode = mode;
        Ok(())
    }

    pub fn channel_mode(&self) -> ChannelMode {
        self.mode
    }

    /// Append one encoded fragment, preserving arrival order.
    pub fn append(&mut self, fragment: &[u8]) {
        self.total_bytes += fragment.len();
        self.fragments.push(fragment.to_vec());
        debug!(
            "Buffered fragment #{}: {} bytes, {:.1}s total",
            self.fragments.len(),
            fragment.len(),
            self.duration_seconds()
        );
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Duration of the buffered session audio, from the byte count.
    pub fn duration_seconds(&self) -> f64 {
        let frame_bytes = 2 * self.mode.wire_channels() as usize;
        (self.total_bytes / frame_bytes) as f64 / self.sample_rate as f64
    }

    /// Decode every buffered fragment and reduce to the mono signal.
    ///
    /// This is also the transcription view of the session: the engine is
    /// invoked on the entire accumulated audio, not on individual chunks.
    pub fn mono_samples(&self) -> AppResult<Vec<i16>> {
        let mut interleaved = Vec::with_capacity(self.total_bytes / 2);
        for (index, fragment) in self.fragments.iter().enumerate() {
            let samples = processor::decode_pcm(fragment).map_err(|_| {
                AppError::CorruptAudio(format!(
                    "Fragment {} of {} cannot be decoded as 16-bit PCM",
                    index + 1,
                    self.fragments.len()
                ))
            })?;
            interleaved.extend(samples);
        }

        if interleaved.len() % self.mode.wire_channels() as usize != 0 {
            return Err(AppError::CorruptAudio(
                "Accumulated audio does not divide into whole frames".to_string(),
            ));
        }

        Ok(processor::mixdown(&interleaved, self.mode))
    }

    /// Concatenate all fragments into a single WAV artifact.
    ///
    /// Succeeds for zero or one fragments: an empty session produces a
    /// valid zero-duration container.
    pub fn finalize(&self) -> AppResult<AudioArtifact> {
        let samples = self.mono_samples()?;
        let path = self.audio_dir.join(format!("{}_recording.wav", self.session_id));
        write_wav(&path, &samples, self.sample_rate)?;

        let duration_seconds = samples.len() as f64 / self.sample_rate as f64;
        info!(
            "Finalized session {}: {} fragments, {:.2}s -> {:?}",
            self.session_id,
            self.fragments.len(),
            duration_seconds,
            path
        );

        Ok(AudioArtifact {
            path,
            duration_seconds,
            samples,
        })
    }

    /// Splice a previously saved artifact in front of this session's audio.
    ///
    /// The combined signal replaces the prior file (write-temp-then-rename),
    /// so the artifact path recorded on a saved transcription stays valid.
    pub fn concatenate_with_prior(&self, prior_path: &Path) -> AppResult<AudioArtifact> {
        if !prior_path.exists() {
            return Err(AppError::MissingPriorAudio(format!(
                "Prior audio artifact not found: {}",
                prior_path.display()
            )));
        }

        let (prior_samples, prior_rate) = read_wav(prior_path)?;
        if prior_rate != self.sample_rate {
            return Err(AppError::CorruptAudio(format!(
                "Prior audio sample rate {} does not match session rate {}",
                prior_rate, self.sample_rate
            )));
        }

        let new_samples = self.mono_samples()?;
        let prior_duration = prior_samples.len() as f64 / self.sample_rate as f64;

        let mut combined = prior_samples;
        combined.extend_from_slice(&new_samples);
        let duration_seconds = combined.len() as f64 / self.sample_rate as f64;

        let tmp_path = self
            .audio_dir
            .join(format!("{}_concatenated.wav", self.session_id));
        write_wav(&tmp_path, &combined, self.sample_rate)?;
        fs::rename(&tmp_path, prior_path)?;

        info!(
            "Concatenated {:.2}s prior + {:.2}s new = {:.2}s -> {:?}",
            prior_duration,
            new_samples.len() as f64 / self.sample_rate as f64,
            duration_seconds,
            prior_path
        );

        Ok(AudioArtifact {
            path: prior_path.to_path_buf(),
            duration_seconds,
            samples: combined,
        })
    }
}

/// Write mono 16-bit samples as a PCM WAV file.
pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, sample_rate, 16);
    let mut file = fs::File::create(path)?;
    wav::write(header, &wav::BitDepth::Sixteen(samples.to_vec()), &mut file)
        .map_err(|e| AppError::CorruptAudio(format!("Failed to write WAV container: {}", e)))?;
    Ok(())
}

/// Read a PCM WAV file back into mono samples.
///
/// Stereo files are averaged down to mono so pre-existing artifacts from
/// other tools remain usable as resume targets.
pub fn read_wav(path: &Path) -> AppResult<(Vec<i16>, u32)> {
    let mut file = fs::File::open(path).map_err(|e| {
        AppError::MissingPriorAudio(format!("Cannot open {}: {}", path.display(), e))
    })?;

    let (header, data) = wav::read(&mut file)
        .map_err(|e| AppError::CorruptAudio(format!("Invalid WAV container: {}", e)))?;

    let samples = match data {
        wav::BitDepth::Sixteen(samples) => samples,
        other => {
            return Err(AppError::CorruptAudio(format!(
                "Unsupported WAV bit depth: {:?}",
                other
            )))
        }
    };

    let mono = match header.channel_count {
        1 => samples,
        2 => {
            warn!("Prior artifact {:?} is stereo, averaging to mono", path);
            samples
                .chunks_exact(2)
                .map(|pair| (((pair[0] as i32) + (pair[1] as i32)) / 2) as i16)
                .collect()
        }
        n => {
            return Err(AppError::CorruptAudio(format!(
                "Unsupported WAV channel count: {}",
                n
            )))
        }
    };

    Ok((mono, header.sampling_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RATE: u32 = 16_000;

    /// One mono fragment of `secs` seconds of a quiet ramp signal.
    fn mono_fragment(secs: f64) -> Vec<u8> {
        let samples = (secs * RATE as f64) as usize;
        let mut bytes = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            let value = ((i % 200) as i16 - 100) * 50;
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    fn buffer(dir: &Path, id: &str) -> AudioChunkBuffer {
        AudioChunkBuffer::new(id, dir.to_path_buf(), RATE, ChannelMode::Single)
    }

    #[test]
    fn test_finalize_duration_matches_fragment_sum() {
        let dir = tempdir().unwrap();
        let mut buf = buffer(dir.path(), "s1");

        for _ in 0..3 {
            buf.append(&mono_fragment(3.0));
        }

        assert_eq!(buf.fragment_count(), 3);
        let artifact = buf.finalize().unwrap();
        assert!((artifact.duration_seconds - 9.0).abs() < 0.5);
        assert!(artifact.path.exists());

        // Round-trip through the container preserves the sample count
        let (samples, rate) = read_wav(&artifact.path).unwrap();
        assert_eq!(rate, RATE);
        assert_eq!(samples.len(), artifact.samples.len());
    }

    #[test]
    fn test_finalize_degenerate_sessions() {
        let dir = tempdir().unwrap();

        // Zero fragments: valid empty artifact
        let empty = buffer(dir.path(), "empty").finalize().unwrap();
        assert_eq!(empty.duration_seconds, 0.0);
        assert!(empty.path.exists());

        // One fragment
        let mut single = buffer(dir.path(), "single");
        single.append(&mono_fragment(1.5));
        let artifact = single.finalize().unwrap();
        assert!((artifact.duration_seconds - 1.5).abs() < 0.5);
    }

    #[test]
    fn test_finalize_rejects_undecodable_fragment() {
        let dir = tempdir().unwrap();
        let mut buf = buffer(dir.path(), "bad");
        buf.append(&mono_fragment(1.0));
        buf.append(&[0x01, 0x02, 0x03]); // torn sample

        match buf.finalize() {
            Err(AppError::CorruptAudio(_)) => {}
            other => panic!("Expected CorruptAudio, got {:?}", other.map(|a| a.path)),
        }
    }

    #[test]
    fn test_concatenate_with_prior_is_additive() {
        let dir = tempdir().unwrap();

        // First recording: 9 seconds
        let mut first = buffer(dir.path(), "first");
        for _ in 0..3 {
            first.append(&mono_fragment(3.0));
        }
        let prior = first.finalize().unwrap();

        // Resumed recording: 5 more seconds onto the prior artifact
        let mut second = buffer(dir.path(), "second");
        second.append(&mono_fragment(5.0));
        let combined = second.concatenate_with_prior(&prior.path).unwrap();

        assert!((combined.duration_seconds - 14.0).abs() < 0.5);
        assert!(combined.duration_seconds >= prior.duration_seconds);
        // The combined artifact replaces the prior path
        assert_eq!(combined.path, prior.path);
        let (samples, _) = read_wav(&combined.path).unwrap();
        assert_eq!(samples.len(), combined.samples.len());
    }

    #[test]
    fn test_concatenate_missing_prior() {
        let dir = tempdir().unwrap();
        let mut buf = buffer(dir.path(), "resume");
        buf.append(&mono_fragment(2.0));

        let missing = dir.path().join("nope.wav");
        match buf.concatenate_with_prior(&missing) {
            Err(AppError::MissingPriorAudio(_)) => {}
            other => panic!("Expected MissingPriorAudio, got {:?}", other.map(|a| a.path)),
        }
    }

    #[test]
    fn test_stereo_mixdown_halves_duration() {
        let dir = tempdir().unwrap();
        let mut buf =
            AudioChunkBuffer::new("stereo", dir.path().to_path_buf(), RATE, ChannelMode::Both);

        // 2 seconds of stereo frames = 4 bytes per frame
        let frames = 2 * RATE as usize;
        let mut bytes = Vec::with_capacity(frames * 4);
        for _ in 0..frames {
            bytes.extend_from_slice(&100i16.to_le_bytes());
            bytes.extend_from_slice(&200i16.to_le_bytes());
        }
        buf.append(&bytes);

        assert!((buf.duration_seconds() - 2.0).abs() < 0.01);
        let artifact = buf.finalize().unwrap();
        assert!((artifact.duration_seconds - 2.0).abs() < 0.5);
        assert!(artifact.samples.iter().all(|&s| s == 150));
    }

    #[test]
    fn test_channel_mode_locked_after_audio() {
        let dir = tempdir().unwrap();
        let mut buf = buffer(dir.path(), "locked");
        assert!(buf.set_channel_mode(ChannelMode::Both).is_ok());
        buf.append(&[0u8; 8]);
        assert!(buf.set_channel_mode(ChannelMode::Left).is_err());
    }
}
