//! # Streaming Session Module
//!
//! The per-connection recording pipeline: chunk arrival, cadence-driven
//! inference over the growing session audio, deduplicated incremental text
//! emission, and finalization into a persistable artifact.
//!
//! ## Key Components:
//! - **Session**: the state machine driving one recording
//!   (`Idle → AwaitingModel → Streaming → Finalizing → Completed`, with
//!   `Aborted` reachable from any non-terminal state)
//! - **Dedup**: segment-level longest-common-prefix matching that keeps the
//!   emitted text stream append-only even though every inference pass
//!   re-transcribes the whole accumulated audio

pub mod dedup;
pub mod session;

pub use session::{SessionEvent, SessionSettings, StreamSession};
