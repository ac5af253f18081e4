//! Port traits: the hexagonal architecture boundary.
//!
//! These traits are defined here in `notebook-core` (pure Rust).
//! Implementations live in `notebook-platform` (native adapters).
//! The core never imports platform code; it only depends on these traits.

use async_trait::async_trait;
use notebook_types::{
    file::FileEntry,
    model::ModelId,
    session::HistoryRecord,
    Result,
};

// ─── Agent Port ──────────────────────────────────────────────

/// Conversational agent backend.
///
/// Streamed response text and tool activity are not returned here: the
/// adapter publishes them on the shared [`EventBus`](crate::event_bus::EventBus)
/// while `send_prompt` is pending.
#[async_trait(?Send)]
pub trait AgentPort {
    /// Start a new backend-side conversation
    async fn create_session(&self) -> Result<String>;

    /// Resume a persisted conversation. The returned id may differ from
    /// `saved_id` when the backend had to start a fresh conversation.
    async fn load_session(&self, saved_id: &str) -> Result<String>;

    /// Release a conversation
    async fn close_session(&self, session_id: &str) -> Result<()>;

    async fn set_model(&self, session_id: &str, model: ModelId) -> Result<()>;

    /// Send a prompt with the context files that have not been delivered yet.
    /// Resolves with the final text once the backend finishes the turn.
    async fn send_prompt(
        &self,
        session_id: &str,
        text: &str,
        context_paths: &[String],
    ) -> Result<String>;

    /// Ask the backend to stop the in-flight prompt
    async fn cancel_prompt(&self, session_id: &str) -> Result<()>;
}

// ─── Files Port ──────────────────────────────────────────────

#[async_trait(?Send)]
pub trait FilesPort {
    /// Supported documents in the workspace
    async fn list_files(&self) -> Result<Vec<FileEntry>>;

    /// Text content of a document; fails with `NotebookError::Read`
    async fn read_file_content(&self, path: &str) -> Result<String>;
}

// ─── History Port ────────────────────────────────────────────

#[async_trait(?Send)]
pub trait HistoryPort {
    /// Write a transcript snapshot, replacing any earlier one for the session
    async fn save_history(&self, record: &HistoryRecord) -> Result<()>;

    /// All saved transcripts, most recently updated first
    async fn load_history(&self) -> Result<Vec<HistoryRecord>>;
}
