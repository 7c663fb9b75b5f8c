//! # Streaming Session State Machine
//!
//! One `StreamSession` drives one recording over one WebSocket connection:
//!
//! ```text
//! Idle --select_model--> AwaitingModel --model ready--> Streaming
//! Streaming --audio chunk--> Streaming            (cadence may trigger inference)
//! Streaming --end_recording--> Finalizing --complete--> Completed
//! any non-terminal --disconnect/error--> Aborted
//! ```
//!
//! Chunk ingestion is a pure append. On a cadence (a configurable number of
//! seconds of new audio since the last completed pass) the session hands the
//! caller an [`InferencePass`] over the *entire* accumulated audio; the
//! caller runs it outside the session lock and reports back through
//! [`StreamSession::complete_inference`]. A cadence tick that fires while a
//! pass is in flight is skipped, not queued, so a slow model never builds a
//! backlog.
//!
//! Finalization concatenates the audio (splicing in the resume target if one
//! was set), then runs one last pass over the complete audio; that pass is
//! authoritative and supersedes everything streamed before it. Disconnecting
//! in any earlier state discards all in-memory state with no persistence
//! side effect.

use crate::audio::chunk::{AudioArtifact, AudioChunkBuffer};
use crate::audio::processor::{self, ChannelMode};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::stream::dedup;
use crate::transcription::{
    segments_to_text, LoadProgress, SpeechToText, TranscriptSegment,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingModel,
    Streaming,
    Finalizing,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingModel => "awaiting_model",
            SessionState::Streaming => "streaming",
            SessionState::Finalizing => "finalizing",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        }
    }
}

/// Fire-and-forget notifications emitted toward the connection.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Human-readable progress line
    Status { message: String },
    /// Model download heartbeat
    DownloadProgress { message: String },
    /// The selected model is resident and validated
    ModelReady,
    /// Newly confirmed transcript suffix - never re-sends emitted text
    Transcription {
        text: String,
        segments: Vec<TranscriptSegment>,
    },
    /// Terminal success: the finalized artifact and authoritative transcript
    Completed {
        audio_url: String,
        duration_seconds: f64,
        text: String,
    },
    /// Recoverable or terminal failure, tagged with the error kind
    Error { kind: String, message: String },
}

/// Session-scoped knobs lifted out of the application config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub audio_dir: PathBuf,
    pub sample_rate: u32,
    /// Seconds of new audio that trigger an inference pass
    pub transcribe_interval_secs: f64,
    /// Minimum accumulated audio before the first pass
    pub min_transcribe_secs: f64,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            audio_dir: config.storage.audio_dir.clone(),
            sample_rate: config.audio.sample_rate,
            transcribe_interval_secs: config.audio.transcribe_interval_secs,
            min_transcribe_secs: config.audio.min_transcribe_secs,
        }
    }
}

/// A snapshot of work for one inference pass, run outside the session lock.
pub struct InferencePass {
    pub samples: Vec<f32>,
    pub language: Option<String>,
    /// Accumulated audio seconds this pass covers; recorded on completion
    pub covered_seconds: f64,
}

/// The finalization workload: artifact already on disk, samples for the
/// authoritative full-audio pass.
pub struct FinalizePass {
    pub artifact: AudioArtifact,
    pub samples: Vec<f32>,
    pub language: Option<String>,
}

/// Per-connection recording state machine.
pub struct StreamSession {
    session_id: String,
    state: SessionState,
    engine: Arc<dyn SpeechToText>,
    settings: SessionSettings,
    buffer: AudioChunkBuffer,
    language: Option<String>,
    /// Prior artifact to splice in front of this recording, if resuming
    resume_prior: Option<PathBuf>,
    /// Everything already sent as `Transcription` events, in order
    emitted: Vec<TranscriptSegment>,
    /// Accumulated audio seconds covered by the last completed pass
    covered_seconds: f64,
    inference_in_flight: bool,
    events: UnboundedSender<SessionEvent>,
}

impl StreamSession {
    pub fn new(
        engine: Arc<dyn SpeechToText>,
        settings: SessionSettings,
        events: UnboundedSender<SessionEvent>,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let buffer = AudioChunkBuffer::new(
            &session_id,
            settings.audio_dir.clone(),
            settings.sample_rate,
            ChannelMode::default(),
        );

        Self {
            session_id,
            state: SessionState::Idle,
            engine,
            settings,
            buffer,
            language: None,
            resume_prior: None,
            emitted: Vec::new(),
            covered_seconds: 0.0,
            inference_in_flight: false,
            events,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn engine(&self) -> Arc<dyn SpeechToText> {
        self.engine.clone()
    }

    fn emit(&self, event: SessionEvent) {
        // The receiver disappears when the connection closes; nothing to do
        let _ = self.events.send(event);
    }

    fn status(&self, message: impl Into<String>) {
        self.emit(SessionEvent::Status {
            message: message.into(),
        });
    }

    /// Select (or switch) the Whisper model for this session.
    ///
    /// Blocks session progression until the model is resident, emitting
    /// progress events while the load runs. A different model mid-session
    /// re-enters `AwaitingModel` and reloads before the next inference.
    pub async fn select_model(&mut self, model: &str) -> AppResult<()> {
        match self.state {
            SessionState::Idle | SessionState::AwaitingModel | SessionState::Streaming => {}
            other => {
                return Err(AppError::ValidationError(format!(
                    "Cannot select a model while {}",
                    other.as_str()
                )))
            }
        }

        let size = model
            .parse()
            .map_err(|e| AppError::ValidationError(format!("{}", e)))?;

        self.state = SessionState::AwaitingModel;
        self.status(format!("Loading {} model...", size));

        let events = self.events.clone();
        let result = self
            .engine
            .ensure_model(
                size,
                Box::new(move |progress| {
                    let event = match progress {
                        LoadProgress::Downloading { elapsed_seconds } => {
                            SessionEvent::DownloadProgress {
                                message: format!(
                                    "Downloading model... ({}s elapsed)",
                                    elapsed_seconds
                                ),
                            }
                        }
                        LoadProgress::Loading { model } => SessionEvent::Status {
                            message: format!("Verifying {} model...", model),
                        },
                        LoadProgress::Ready { .. } => SessionEvent::ModelReady,
                    };
                    let _ = events.send(event);
                }),
            )
            .await;

        match result {
            Ok(()) => {
                self.state = SessionState::Streaming;
                self.status("Ready to record");
                info!("Session {} ready with model {}", self.session_id, size);
                Ok(())
            }
            Err(e) => {
                // Back to Idle so the client can retry with another model
                self.state = SessionState::Idle;
                warn!("Session {} model load failed: {}", self.session_id, e);
                Err(e)
            }
        }
    }

    /// Set the channel mode. Only valid before any audio has arrived.
    pub fn set_channel(&mut self, mode: ChannelMode) -> AppResult<()> {
        if self.state.is_terminal() || self.state == SessionState::Finalizing {
            return Err(AppError::ValidationError(
                "Cannot change channel after recording ended".to_string(),
            ));
        }

        self.buffer.set_channel_mode(mode)?;
        self.status(format!("Channel set to: {}", mode.as_str()));
        Ok(())
    }

    /// Set or clear the language hint.
    pub fn set_language(&mut self, language: Option<String>) {
        self.status(format!(
            "Language set to: {}",
            language.as_deref().unwrap_or("auto-detect")
        ));
        self.language = language;
    }

    /// Point this session at a previously saved artifact to append to.
    ///
    /// Accepts the `/api/audio/<file>` form the completion event hands out.
    /// Must be called before streaming begins; a missing artifact leaves the
    /// resume state unchanged.
    pub fn set_resume_audio(&mut self, audio_path: &str) -> AppResult<()> {
        if self.buffer.fragment_count() > 0 {
            return Err(AppError::ValidationError(
                "Resume target must be set before streaming begins".to_string(),
            ));
        }

        let filename = audio_path
            .strip_prefix("/api/audio/")
            .unwrap_or(audio_path);
        if filename.contains('/') || filename.contains("..") {
            return Err(AppError::ValidationError(format!(
                "Invalid audio path: {}",
                audio_path
            )));
        }

        let full_path = self.settings.audio_dir.join(filename);
        if !full_path.exists() {
            return Err(AppError::MissingPriorAudio(format!(
                "Audio file not found: {}",
                audio_path
            )));
        }

        info!(
            "Session {} resuming from artifact {:?}",
            self.session_id, full_path
        );
        self.resume_prior = Some(full_path);
        self.status("Resuming from previous recording");
        Ok(())
    }

    /// Ingest one audio fragment.
    ///
    /// Pure append; returns `Some(InferencePass)` when the cadence is due
    /// and no pass is currently in flight. The caller runs the pass and
    /// reports back through [`complete_inference`](Self::complete_inference).
    pub fn push_chunk(&mut self, data: &[u8]) -> AppResult<Option<InferencePass>> {
        match self.state {
            SessionState::Streaming => {}
            SessionState::Idle | SessionState::AwaitingModel => {
                return Err(AppError::ValidationError(
                    "No model selected. Send set_model first.".to_string(),
                ))
            }
            other => {
                return Err(AppError::ValidationError(format!(
                    "Session is {} and no longer accepts audio",
                    other.as_str()
                )))
            }
        }

        processor::validate_fragment(data, self.buffer.channel_mode())?;
        self.buffer.append(data);

        let total = self.buffer.duration_seconds();
        let due = total >= self.settings.min_transcribe_secs
            && total - self.covered_seconds >= self.settings.transcribe_interval_secs;

        if !due {
            return Ok(None);
        }

        if self.inference_in_flight {
            // Coalesce: skip this tick entirely, the next chunk re-checks
            debug!(
                "Session {}: cadence due at {:.1}s but a pass is in flight, skipping",
                self.session_id, total
            );
            return Ok(None);
        }

        let samples = processor::pcm_to_float(&self.buffer.mono_samples()?);
        self.inference_in_flight = true;

        Ok(Some(InferencePass {
            samples,
            language: self.language.clone(),
            covered_seconds: total,
        }))
    }

    /// Record the outcome of an inference pass started by `push_chunk`.
    ///
    /// A failed pass is reported and retried naturally on the next cadence
    /// tick; it never kills the session.
    pub fn complete_inference(
        &mut self,
        covered_seconds: f64,
        result: AppResult<Vec<TranscriptSegment>>,
    ) {
        self.inference_in_flight = false;

        if self.state != SessionState::Streaming {
            debug!(
                "Session {}: dropping inference result in state {}",
                self.session_id,
                self.state.as_str()
            );
            return;
        }

        match result {
            Ok(latest) => {
                let fresh = dedup::newly_confirmed(&self.emitted, &latest).to_vec();
                // Mark the audio covered even when nothing new came out, so
                // the same prefix is not re-transcribed next tick
                self.covered_seconds = self.covered_seconds.max(covered_seconds);

                if fresh.is_empty() {
                    debug!("Session {}: no new text after dedup", self.session_id);
                    return;
                }

                let text = segments_to_text(&fresh);
                self.emitted.extend(fresh.iter().cloned());
                self.emit(SessionEvent::Transcription {
                    text,
                    segments: fresh,
                });
            }
            Err(e) => {
                warn!("Session {} inference failed: {}", self.session_id, e);
                self.emit(SessionEvent::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// End the recording: mux the artifact and hand back the finalization
    /// pass over the complete audio.
    ///
    /// Audio failures here are terminal for the session - without a valid
    /// artifact there is nothing to persist.
    pub fn end_recording(&mut self) -> AppResult<FinalizePass> {
        match self.state {
            SessionState::Streaming => {}
            SessionState::Idle | SessionState::AwaitingModel => {
                return Err(AppError::ValidationError(
                    "No model selected. Send set_model first.".to_string(),
                ))
            }
            other => {
                return Err(AppError::ValidationError(format!(
                    "Cannot end recording while {}",
                    other.as_str()
                )))
            }
        }

        self.state = SessionState::Finalizing;
        self.status("Processing final audio...");

        let artifact = match &self.resume_prior {
            Some(prior) => self.buffer.concatenate_with_prior(prior),
            None => self.buffer.finalize(),
        };

        let artifact = match artifact {
            Ok(artifact) => artifact,
            Err(e) => {
                self.state = SessionState::Aborted;
                return Err(e);
            }
        };

        let samples = processor::pcm_to_float(&artifact.samples);
        Ok(FinalizePass {
            artifact,
            samples,
            language: self.language.clone(),
        })
    }

    /// Record the outcome of the authoritative finalization pass.
    ///
    /// If the final pass failed, the streamed accumulation stands in for the
    /// authoritative transcript - the artifact itself is already valid.
    pub fn complete_finalize(
        &mut self,
        artifact: &AudioArtifact,
        result: AppResult<Vec<TranscriptSegment>>,
    ) {
        if self.state != SessionState::Finalizing {
            return;
        }

        let text = match result {
            Ok(segments) => segments_to_text(&segments),
            Err(e) => {
                warn!(
                    "Session {} final transcription failed, falling back to streamed text: {}",
                    self.session_id, e
                );
                self.emit(SessionEvent::Error {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                });
                segments_to_text(&self.emitted)
            }
        };

        let audio_url = artifact
            .path
            .file_name()
            .map(|name| format!("/api/audio/{}", name.to_string_lossy()))
            .unwrap_or_default();

        info!(
            "Session {} completed: {:.2}s, {} chars",
            self.session_id,
            artifact.duration_seconds,
            text.len()
        );

        self.emit(SessionEvent::Completed {
            audio_url,
            duration_seconds: artifact.duration_seconds,
            text,
        });
        self.state = SessionState::Completed;
    }

    /// Abort on disconnect or unrecoverable error.
    ///
    /// No persistence side effect; all in-memory state is discarded with the
    /// session. Reconnecting clients restart the protocol from scratch.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            info!(
                "Session {} aborted from state {}",
                self.session_id,
                self.state.as_str()
            );
            self.state = SessionState::Aborted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Scripted engine: one segment per whole 3 seconds of audio, so passes
    /// over growing audio return growing supersets like the real model.
    struct FakeSpeech;

    #[async_trait]
    impl SpeechToText for FakeSpeech {
        async fn ensure_model(
            &self,
            size: crate::transcription::ModelSize,
            progress: Box<dyn Fn(LoadProgress) + Send + Sync>,
        ) -> AppResult<()> {
            progress(LoadProgress::Ready { model: size });
            Ok(())
        }

        async fn transcribe(
            &self,
            samples: &[f32],
            _language: Option<&str>,
        ) -> AppResult<Vec<TranscriptSegment>> {
            let seconds = samples.len() / 16_000;
            Ok((0..seconds / 3)
                .map(|i| {
                    TranscriptSegment::new(
                        format!("segment {}", i),
                        (i * 3) as f64,
                        ((i + 1) * 3) as f64,
                    )
                })
                .collect())
        }
    }

    /// An engine whose model never loads.
    struct BrokenSpeech;

    #[async_trait]
    impl SpeechToText for BrokenSpeech {
        async fn ensure_model(
            &self,
            _size: crate::transcription::ModelSize,
            _progress: Box<dyn Fn(LoadProgress) + Send + Sync>,
        ) -> AppResult<()> {
            Err(AppError::ModelLoad("no network".to_string()))
        }

        async fn transcribe(
            &self,
            _samples: &[f32],
            _language: Option<&str>,
        ) -> AppResult<Vec<TranscriptSegment>> {
            Err(AppError::Inference("unreachable".to_string()))
        }
    }

    fn settings(dir: &std::path::Path) -> SessionSettings {
        SessionSettings {
            audio_dir: dir.to_path_buf(),
            sample_rate: 16_000,
            transcribe_interval_secs: 3.0,
            min_transcribe_secs: 1.0,
        }
    }

    fn mono_chunk(secs: f64) -> Vec<u8> {
        let samples = (secs * 16_000.0) as usize;
        let mut bytes = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            bytes.extend_from_slice(&(((i % 100) as i16) * 10).to_le_bytes());
        }
        bytes
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn streaming_session(
        dir: &std::path::Path,
    ) -> (StreamSession, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = StreamSession::new(Arc::new(FakeSpeech), settings(dir), tx);
        session.set_channel(ChannelMode::Single).unwrap();
        session.select_model("base").await.unwrap();
        assert_eq!(session.state(), SessionState::Streaming);
        drain(&mut rx);
        (session, rx)
    }

    #[tokio::test]
    async fn test_model_selection_event_order() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = StreamSession::new(Arc::new(FakeSpeech), settings(dir.path()), tx);

        assert_eq!(session.state(), SessionState::Idle);
        session.select_model("base").await.unwrap();

        let events = drain(&mut rx);
        assert!(matches!(events[0], SessionEvent::Status { .. }));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::ModelReady)));
        // "Ready to record" comes after ModelReady
        match events.last().unwrap() {
            SessionEvent::Status { message } => assert_eq!(message, "Ready to record"),
            other => panic!("Unexpected final event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_model_load_failure_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = StreamSession::new(Arc::new(BrokenSpeech), settings(dir.path()), tx);

        let result = session.select_model("base").await;
        assert!(matches!(result, Err(AppError::ModelLoad(_))));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_chunks_rejected_before_model() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = StreamSession::new(Arc::new(FakeSpeech), settings(dir.path()), tx);

        assert!(session.push_chunk(&mono_chunk(1.0)).is_err());
    }

    #[tokio::test]
    async fn test_streaming_scenario_three_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut rx) = streaming_session(dir.path()).await;
        let engine = session.engine();

        // Three chunks of 3 seconds each; every chunk makes the cadence due
        let mut emitted_texts: Vec<String> = Vec::new();
        for _ in 0..3 {
            let pass = session.push_chunk(&mono_chunk(3.0)).unwrap().unwrap();
            let result = engine.transcribe(&pass.samples, None).await;
            session.complete_inference(pass.covered_seconds, result);

            for event in drain(&mut rx) {
                if let SessionEvent::Transcription { text, .. } = event {
                    emitted_texts.push(text);
                }
            }
        }

        // Incremental, deduplicated emission
        assert_eq!(
            emitted_texts,
            vec!["segment 0", "segment 1", "segment 2"]
        );

        // Finalize: duration ~9s, authoritative text covers everything
        let pass = session.end_recording().unwrap();
        let result = engine.transcribe(&pass.samples, None).await;
        let artifact = pass.artifact.clone();
        session.complete_finalize(&artifact, result);

        assert_eq!(session.state(), SessionState::Completed);
        let events = drain(&mut rx);
        let completed = events
            .iter()
            .find_map(|e| match e {
                SessionEvent::Completed {
                    audio_url,
                    duration_seconds,
                    text,
                } => Some((audio_url.clone(), *duration_seconds, text.clone())),
                _ => None,
            })
            .expect("no completion event");

        assert!((completed.1 - 9.0).abs() < 0.5);
        assert!(completed.0.starts_with("/api/audio/"));
        assert_eq!(completed.2, "segment 0 segment 1 segment 2");
    }

    #[tokio::test]
    async fn test_inference_ticks_coalesce_while_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = streaming_session(dir.path()).await;

        let first = session.push_chunk(&mono_chunk(3.0)).unwrap();
        assert!(first.is_some());

        // Cadence is due again, but the first pass has not completed
        let second = session.push_chunk(&mono_chunk(3.0)).unwrap();
        assert!(second.is_none());

        // After completion the next chunk can trigger a pass again
        session.complete_inference(3.0, Ok(Vec::new()));
        let third = session.push_chunk(&mono_chunk(3.0)).unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn test_inference_error_keeps_session_alive() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, mut rx) = streaming_session(dir.path()).await;

        let pass = session.push_chunk(&mono_chunk(3.0)).unwrap().unwrap();
        session.complete_inference(
            pass.covered_seconds,
            Err(AppError::Inference("bad window".to_string())),
        );

        assert_eq!(session.state(), SessionState::Streaming);
        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::Error { kind, .. } if kind == "inference_error")));

        // The session still accepts audio afterwards
        assert!(session.push_chunk(&mono_chunk(1.0)).is_ok());
    }

    #[tokio::test]
    async fn test_abort_discards_session() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = streaming_session(dir.path()).await;

        session.push_chunk(&mono_chunk(2.0)).unwrap();
        session.abort();

        assert_eq!(session.state(), SessionState::Aborted);
        assert!(session.push_chunk(&mono_chunk(1.0)).is_err());
        assert!(session.end_recording().is_err());
    }

    #[tokio::test]
    async fn test_resume_requires_existing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = streaming_session(dir.path()).await;

        let result = session.set_resume_audio("/api/audio/absent.wav");
        assert!(matches!(result, Err(AppError::MissingPriorAudio(_))));
    }

    #[tokio::test]
    async fn test_resume_extends_prior_recording() {
        let dir = tempfile::tempdir().unwrap();

        // First recording: 9 seconds, completed normally
        let (mut first, mut rx1) = streaming_session(dir.path()).await;
        for _ in 0..3 {
            if let Some(pass) = first.push_chunk(&mono_chunk(3.0)).unwrap() {
                first.complete_inference(pass.covered_seconds, Ok(Vec::new()));
            }
        }
        let pass = first.end_recording().unwrap();
        let artifact = pass.artifact.clone();
        first.complete_finalize(&artifact, Ok(Vec::new()));
        let audio_url = drain(&mut rx1)
            .into_iter()
            .find_map(|e| match e {
                SessionEvent::Completed { audio_url, .. } => Some(audio_url),
                _ => None,
            })
            .unwrap();

        // Second recording resumes the first and adds 6 seconds
        let (mut second, mut rx2) = streaming_session(dir.path()).await;
        second.set_resume_audio(&audio_url).unwrap();
        second.push_chunk(&mono_chunk(6.0)).unwrap();

        let pass = second.end_recording().unwrap();
        let engine = second.engine();
        let result = engine.transcribe(&pass.samples, None).await;
        let artifact = pass.artifact.clone();
        second.complete_finalize(&artifact, result);

        let completed = drain(&mut rx2)
            .into_iter()
            .find_map(|e| match e {
                SessionEvent::Completed {
                    duration_seconds,
                    text,
                    ..
                } => Some((duration_seconds, text)),
                _ => None,
            })
            .unwrap();

        // Combined duration and a transcript freshly computed over the
        // whole 15 seconds (5 fake segments), not a concatenation of texts
        assert!((completed.0 - 15.0).abs() < 0.5);
        assert_eq!(
            completed.1,
            "segment 0 segment 1 segment 2 segment 3 segment 4"
        );
    }

    #[tokio::test]
    async fn test_resume_must_precede_streaming() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _rx) = streaming_session(dir.path()).await;

        session.push_chunk(&mono_chunk(1.0)).unwrap();
        let result = session.set_resume_audio("/api/audio/whatever.wav");
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }
}
