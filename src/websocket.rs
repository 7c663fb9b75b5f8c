//! # WebSocket Session Controller
//!
//! Binds one WebSocket connection to one [`StreamSession`]: inbound JSON
//! messages become session operations, session events flow back out as
//! JSON. No business logic lives here beyond message validation and
//! routing.
//!
//! ## Protocol (client → server, tagged by `type`):
//! - `set_model {model}` - select/switch the Whisper model
//! - `set_channel {channel}` - left | right | both | single
//! - `set_language {language}` - ISO code or null for auto-detect
//! - `set_resume_audio {audio_path}` - append to a prior recording
//! - `audio_chunk {data, duration}` - base64 PCM fragment
//! - `end_recording {}` - finalize
//! - `ping {}` - keepalive
//!
//! ## Server → client:
//! - `status {message, audio_url?, duration_seconds?, text?}` - progress;
//!   the completion status carries the artifact URL, total duration, and
//!   the authoritative transcript
//! - `download_progress {message}`, `model_ready {}`
//! - `transcription {text, segments}` - newly confirmed suffix only
//! - `error {kind, message}` - the connection stays open
//!
//! Malformed or unknown messages produce an `error` event; the session
//! protocol continues. Disconnecting aborts the session with no
//! persistence side effect.

use crate::error::AppError;
use crate::state::AppState;
use crate::stream::session::{SessionEvent, SessionSettings, StreamSession};
use crate::transcription::TranscriptSegment;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Messages accepted from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SetModel {
        model: String,
    },
    SetChannel {
        channel: String,
    },
    SetLanguage {
        language: Option<String>,
    },
    SetResumeAudio {
        audio_path: String,
    },
    AudioChunk {
        /// Base64-encoded 16-bit little-endian PCM
        data: String,
        /// Client-side duration estimate, kept for logging only - the
        /// server derives durations from the sample count
        #[serde(default)]
        duration: f64,
    },
    EndRecording,
    Ping,
}

/// Messages sent to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_seconds: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    DownloadProgress {
        message: String,
    },
    ModelReady,
    Transcription {
        text: String,
        segments: Vec<TranscriptSegment>,
    },
    Pong,
    Error {
        kind: String,
        message: String,
    },
}

impl ServerMessage {
    fn status(message: impl Into<String>) -> Self {
        ServerMessage::Status {
            message: message.into(),
            audio_url: None,
            duration_seconds: None,
            text: None,
        }
    }

    fn from_error(err: &AppError) -> Self {
        ServerMessage::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Status { message } => ServerMessage::status(message),
            SessionEvent::DownloadProgress { message } => {
                ServerMessage::DownloadProgress { message }
            }
            SessionEvent::ModelReady => ServerMessage::ModelReady,
            SessionEvent::Transcription { text, segments } => {
                ServerMessage::Transcription { text, segments }
            }
            SessionEvent::Completed {
                audio_url,
                duration_seconds,
                text,
            } => ServerMessage::Status {
                message: "Recording completed. Transcription finished.".to_string(),
                audio_url: Some(audio_url),
                duration_seconds: Some(duration_seconds),
                text: Some(text),
            },
            SessionEvent::Error { kind, message } => ServerMessage::Error { kind, message },
        }
    }
}

/// Actor message for pushing a serialized frame to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct Outbound(ServerMessage);

/// WebSocket actor owning one streaming session.
pub struct SessionSocket {
    app_state: web::Data<AppState>,
    session: Arc<Mutex<StreamSession>>,
    /// Taken by the event-forwarding task when the actor starts
    events: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    last_heartbeat: Instant,
}

impl SessionSocket {
    const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(app_state: web::Data<AppState>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = SessionSettings::from_config(&app_state.get_config());
        let session = StreamSession::new(app_state.engine.clone(), settings, tx);

        Self {
            app_state,
            session: Arc::new(Mutex::new(session)),
            events: Some(rx),
            last_heartbeat: Instant::now(),
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: ServerMessage) {
        if let Ok(json) = serde_json::to_string(&message) {
            ctx.text(json);
        }
    }

    fn dispatch(&mut self, message: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let session = self.session.clone();
        let addr = ctx.address();

        match message {
            ClientMessage::SetModel { model } => {
                tokio::spawn(async move {
                    let result = session.lock().await.select_model(&model).await;
                    if let Err(e) = result {
                        addr.do_send(Outbound(ServerMessage::from_error(&e)));
                    }
                });
            }

            ClientMessage::SetChannel { channel } => {
                tokio::spawn(async move {
                    let result = match crate::audio::processor::ChannelMode::from_str(&channel) {
                        Ok(mode) => session.lock().await.set_channel(mode),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        addr.do_send(Outbound(ServerMessage::from_error(&e)));
                    }
                });
            }

            ClientMessage::SetLanguage { language } => {
                tokio::spawn(async move {
                    session.lock().await.set_language(language);
                });
            }

            ClientMessage::SetResumeAudio { audio_path } => {
                tokio::spawn(async move {
                    if let Err(e) = session.lock().await.set_resume_audio(&audio_path) {
                        addr.do_send(Outbound(ServerMessage::from_error(&e)));
                    }
                });
            }

            ClientMessage::AudioChunk { data, duration } => {
                let bytes = match BASE64.decode(data.as_bytes()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        self.send(
                            ctx,
                            ServerMessage::Error {
                                kind: "protocol".to_string(),
                                message: format!("Invalid base64 audio payload: {}", e),
                            },
                        );
                        return;
                    }
                };
                debug!("Received audio chunk: {} bytes, ~{:.1}s", bytes.len(), duration);

                tokio::spawn(async move {
                    // Append under the lock, infer outside it: chunk
                    // ingestion stays non-blocking for the session
                    let pass = { session.lock().await.push_chunk(&bytes) };
                    match pass {
                        Ok(Some(pass)) => {
                            let engine = { session.lock().await.engine() };
                            let result =
                                engine.transcribe(&pass.samples, pass.language.as_deref()).await;
                            session
                                .lock()
                                .await
                                .complete_inference(pass.covered_seconds, result);
                        }
                        Ok(None) => {}
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }

            ClientMessage::EndRecording => {
                tokio::spawn(async move {
                    let finalize = { session.lock().await.end_recording() };
                    match finalize {
                        Ok(pass) => {
                            let engine = { session.lock().await.engine() };
                            let result =
                                engine.transcribe(&pass.samples, pass.language.as_deref()).await;
                            session
                                .lock()
                                .await
                                .complete_finalize(&pass.artifact, result);
                        }
                        Err(e) => addr.do_send(Outbound(ServerMessage::from_error(&e))),
                    }
                });
            }

            ClientMessage::Ping => {
                self.send(ctx, ServerMessage::Pong);
            }
        }
    }
}

impl Actor for SessionSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection started");
        self.send(ctx, ServerMessage::status("Connected. Ready to receive audio."));

        // Forward session events to the client for the connection lifetime
        if let Some(mut events) = self.events.take() {
            let addr = ctx.address();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    addr.do_send(Outbound(event.into()));
                }
            });
        }

        ctx.run_interval(Self::HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > Self::CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection stopped");
        self.app_state.end_session();

        // Abort discards all in-memory session state; nothing is persisted
        let session = self.session.clone();
        tokio::spawn(async move {
            session.lock().await.abort();
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for SessionSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => self.dispatch(message, ctx),
                    Err(e) => {
                        // Unknown or malformed type: report, keep the
                        // connection open
                        self.send(
                            ctx,
                            ServerMessage::Error {
                                kind: "protocol".to_string(),
                                message: format!("Invalid message: {}", e),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.send(
                    ctx,
                    ServerMessage::Error {
                        kind: "protocol".to_string(),
                        message: "Binary frames are not part of this protocol; send audio_chunk messages".to_string(),
                    },
                );
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed: {:?}", reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(err) => {
                warn!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<Outbound> for SessionSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        self.send(ctx, msg.0);
    }
}

/// `GET /ws/transcribe` - upgrade to a streaming session.
pub async fn transcribe_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        "New WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    if !app_state.try_begin_session() {
        warn!("Rejecting WebSocket connection: session limit reached");
        return Ok(HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": {
                "type": "session_limit",
                "message": "Maximum concurrent sessions reached"
            }
        })));
    }

    let socket = SessionSocket::new(app_state);
    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "set_model", "model": "base"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SetModel { model } if model == "base"));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "audio_chunk", "data": "AAAA", "duration": 3.0}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::AudioChunk { data, duration } => {
                assert_eq!(data, "AAAA");
                assert_eq!(duration, 3.0);
            }
            other => panic!("Wrong variant: {:?}", other),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "end_recording"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::EndRecording));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "set_language", "language": null}"#).unwrap();
        assert!(matches!(msg, ClientMessage::SetLanguage { language: None }));
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type": "pause_session"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_completion_status_serialization() {
        let event = SessionEvent::Completed {
            audio_url: "/api/audio/abc_recording.wav".to_string(),
            duration_seconds: 9.2,
            text: "hello world".to_string(),
        };

        let json = serde_json::to_value(&ServerMessage::from(event)).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["audio_url"], "/api/audio/abc_recording.wav");
        assert_eq!(json["duration_seconds"], 9.2);
        assert_eq!(json["text"], "hello world");
    }

    #[test]
    fn test_plain_status_omits_completion_fields() {
        let json = serde_json::to_value(&ServerMessage::status("Transcribing...")).unwrap();
        assert_eq!(json["type"], "status");
        assert!(json.get("audio_url").is_none());
        assert!(json.get("duration_seconds").is_none());
    }

    #[test]
    fn test_transcription_message_shape() {
        let msg = ServerMessage::Transcription {
            text: "hello".to_string(),
            segments: vec![TranscriptSegment::new("hello", 0.0, 3.0)],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "transcription");
        assert_eq!(json["segments"][0]["start"], 0.0);
    }
}
