//! In-memory session registry and the working state of the current session.
//!
//! The current session's transcript and context live in the working
//! fields (`transcript`, `context`); every other open session keeps its
//! own copy in the registry. Switching flushes the working state into the
//! outgoing record before loading the incoming one.

use std::cell::RefCell;
use std::rc::Rc;

use notebook_types::{
    message::{Message, Role},
    model::ModelId,
    session::HistoryRecord,
};

use crate::context::ContextTracker;

/// State shared by the lifecycle manager and the prompt runner.
/// Never hold a borrow across an `.await`.
pub type SharedState = Rc<RefCell<NotebookState>>;

/// An open conversation
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub label: String,
    pub messages: Vec<Message>,
    pub context: ContextTracker,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            messages: Vec::new(),
            context: ContextTracker::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct NotebookState {
    /// Transcript of the current session (or of the pre-session workspace)
    pub transcript: Vec<Message>,
    /// Context of the current session (or of the pre-session workspace)
    pub context: ContextTracker,
    pub model: ModelId,
    /// Tool activity indicator for the running prompt
    pub status_text: String,
    sessions: Vec<SessionRecord>,
    current: Option<String>,
    in_flight: bool,
    revision: u64,
}

impl NotebookState {
    pub fn new(model: ModelId) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn shared(model: ModelId) -> SharedState {
        Rc::new(RefCell::new(Self::new(model)))
    }

    // ─── Registry ────────────────────────────────────────────

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_current(&self, session_id: &str) -> bool {
        self.current.as_deref() == Some(session_id)
    }

    /// Open sessions in the order they were opened
    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionRecord> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.session(session_id).is_some()
    }

    /// Add a session, replacing an open one with the same id.
    pub fn register(&mut self, record: SessionRecord) {
        self.sessions.retain(|s| s.id != record.id);
        self.sessions.push(record);
    }

    pub fn remove(&mut self, session_id: &str) -> Option<SessionRecord> {
        let idx = self.sessions.iter().position(|s| s.id == session_id)?;
        Some(self.sessions.remove(idx))
    }

    /// Most recently opened session
    pub fn most_recent(&self) -> Option<&SessionRecord> {
        self.sessions.last()
    }

    /// Flush the working transcript and context into the current session's record.
    pub fn snapshot_current(&mut self) {
        let Some(id) = self.current.clone() else { return };
        let transcript = self.transcript.clone();
        let context = self.context.clone();
        if let Some(record) = self.sessions.iter_mut().find(|s| s.id == id) {
            record.messages = transcript;
            record.context = context;
        }
    }

    /// Make a registered session current, loading its transcript and context
    /// as the working state. Returns false if the session is not open.
    pub fn activate(&mut self, session_id: &str) -> bool {
        let Some(record) = self.session(session_id) else {
            return false;
        };
        let messages = record.messages.clone();
        let context = record.context.clone();
        self.transcript = messages;
        self.context = context;
        self.current = Some(session_id.to_string());
        true
    }

    /// Clear the active pointer together with the working transcript and context.
    pub fn deactivate(&mut self) {
        self.current = None;
        self.transcript.clear();
        self.context.reset();
    }

    // ─── Transcript ──────────────────────────────────────────

    /// Bumped on every change to the working transcript.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Transcript a write for `session_id` should land in: the working copy
    /// when the session is current, its record when it is open in the
    /// background, nothing once it was closed.
    fn transcript_mut(&mut self, session_id: &str) -> Option<&mut Vec<Message>> {
        if self.is_current(session_id) {
            self.revision += 1;
            return Some(&mut self.transcript);
        }
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .map(|s| &mut s.messages)
    }

    pub fn append(&mut self, session_id: &str, message: Message) -> bool {
        match self.transcript_mut(session_id) {
            Some(transcript) => {
                transcript.push(message);
                true
            }
            None => false,
        }
    }

    /// Append to the working transcript regardless of the active pointer,
    /// e.g. a notice that no session could be created.
    pub fn append_working(&mut self, message: Message) {
        self.revision += 1;
        self.transcript.push(message);
    }

    /// Extend the trailing assistant message of a session's transcript.
    pub fn extend_last(&mut self, session_id: &str, text: &str) -> bool {
        match self.transcript_mut(session_id).and_then(|t| t.last_mut()) {
            Some(last) if last.role == Role::Assistant => {
                last.content.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Fill the trailing assistant message if nothing was streamed into it.
    pub fn fill_last_if_empty(&mut self, session_id: &str, text: &str) -> bool {
        match self.transcript_mut(session_id).and_then(|t| t.last_mut()) {
            Some(last) if last.role == Role::Assistant && last.is_empty() => {
                last.content = text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Transcript of any open session (working copy for the current one).
    pub fn messages(&self, session_id: &str) -> Option<&[Message]> {
        if self.is_current(session_id) {
            return Some(&self.transcript);
        }
        self.session(session_id).map(|s| s.messages.as_slice())
    }

    /// Context of any open session (working copy for the current one).
    pub fn context_of(&self, session_id: &str) -> Option<&ContextTracker> {
        if self.is_current(session_id) {
            return Some(&self.context);
        }
        self.session(session_id).map(|s| &s.context)
    }

    pub fn context_of_mut(&mut self, session_id: &str) -> Option<&mut ContextTracker> {
        if self.is_current(session_id) {
            return Some(&mut self.context);
        }
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .map(|s| &mut s.context)
    }

    /// Snapshot of the current session for the history service.
    pub fn current_history(&self) -> Option<HistoryRecord> {
        let id = self.current.as_deref()?;
        let label = self
            .session(id)
            .map(|s| s.label.clone())
            .unwrap_or_else(|| id.to_string());
        Some(HistoryRecord::new(
            id,
            label,
            self.transcript.clone(),
            self.context.sent(),
        ))
    }

    // ─── In-flight prompt ────────────────────────────────────

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    fn begin_prompt(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        self.status_text.clear();
        true
    }

    fn end_prompt(&mut self) {
        self.in_flight = false;
        self.status_text.clear();
    }
}

/// Holds the process-wide in-flight flag. Dropping it clears the flag and
/// the status indicator, whatever path the prompt took.
pub struct InFlight {
    state: SharedState,
}

impl InFlight {
    /// `None` if another prompt is already in flight.
    pub fn acquire(state: &SharedState) -> Option<Self> {
        if !state.borrow_mut().begin_prompt() {
            return None;
        }
        Some(Self {
            state: state.clone(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        match self.state.try_borrow_mut() {
            Ok(mut state) => state.end_prompt(),
            Err(_) => log::error!("In-flight flag could not be cleared: state is borrowed"),
        }
    }
}
