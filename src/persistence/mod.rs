//! # Persistence Module
//!
//! Durable storage for finished recordings: the transcription rows, their
//! append-only edit history, and the soft-delete shadow table.
//!
//! ## Key Components:
//! - **Models**: row structs and the API request/response schemas
//! - **Migrations**: versioned SQLite schema setup
//! - **Store**: the mutation operations and their atomicity guarantees
//!
//! ## Invariants enforced here:
//! - Every content mutation snapshots the previous content as a diff before
//!   overwriting - no data loss on edit or resumed save.
//! - `current_diff_id` never dangles: delete nulls the reference before it
//!   removes the diff rows, all inside one transaction.
//! - A transcription id is live or deleted, never both; restore fails with
//!   a conflict when the live row exists and changes nothing.

pub mod migrations;
pub mod models;
pub mod store;

pub use store::{SaveArtifact, TranscriptionStore};
