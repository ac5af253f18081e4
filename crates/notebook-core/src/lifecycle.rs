//! Session lifecycle manager: create, switch, close, restore.
//!
//! States per session: `absent → created → active ⇄ inactive → closed`.
//! Every operation that changes which transcript receives prompt output
//! (send, switch, new, load) is serialized behind the process-wide
//! in-flight flag. Creation and load failures surface as a visible
//! transcript message; close and model failures are only logged.

use std::rc::Rc;

use notebook_types::{
    file::FileEntry,
    message::Message,
    model::ModelId,
    session::{new_session_label, HistoryRecord},
    NotebookError, Result,
};

use crate::context::ContextTracker;
use crate::event_bus::EventBus;
use crate::persistence::PersistenceSync;
use crate::ports::{AgentPort, FilesPort, HistoryPort};
use crate::runner::PromptRunner;
use crate::store::{InFlight, SessionRecord, SharedState};

/// A prompt holding the in-flight flag, bound to its session.
pub struct PendingPrompt {
    flight: InFlight,
    session_id: String,
    text: String,
}

impl PendingPrompt {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

pub struct SessionManager {
    state: SharedState,
    agent: Rc<dyn AgentPort>,
    files: Rc<dyn FilesPort>,
    sync: Rc<PersistenceSync>,
    runner: PromptRunner,
}

impl SessionManager {
    pub fn new(
        state: SharedState,
        agent: Rc<dyn AgentPort>,
        files: Rc<dyn FilesPort>,
        history: Rc<dyn HistoryPort>,
        bus: EventBus,
    ) -> Self {
        let sync = Rc::new(PersistenceSync::new(history));
        let runner = PromptRunner::new(state.clone(), agent.clone(), bus, sync.clone());
        Self {
            state,
            agent,
            files,
            sync,
            runner,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn runner(&self) -> &PromptRunner {
        &self.runner
    }

    pub fn current_id(&self) -> Option<String> {
        self.state.borrow().current_id().map(str::to_string)
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.borrow().is_in_flight()
    }

    // ─── Creation ────────────────────────────────────────────

    /// Current session id, creating a backend session if there is none.
    /// Creation counts as a prompt-affecting change: it is refused while a
    /// prompt is in flight.
    pub async fn ensure_active(&self) -> Result<String> {
        if let Some(id) = self.current_id() {
            return Ok(id);
        }
        let flight = InFlight::acquire(&self.state).ok_or(NotebookError::PromptInFlight)?;
        self.activate_or_create(&flight).await
    }

    /// The new session inherits the attached context files, none of them sent.
    async fn activate_or_create(&self, _flight: &InFlight) -> Result<String> {
        if let Some(id) = self.current_id() {
            return Ok(id);
        }
        let id = self.open_backend_session().await?;

        let mut state = self.state.borrow_mut();
        let mut record = SessionRecord::new(&id, new_session_label(&id));
        record.context = ContextTracker::restore(state.context.attached(), Vec::new());
        state.register(record);
        state.activate(&id);
        log::info!("Session {} created", id);
        Ok(id)
    }

    /// Start a fresh conversation next to the current one. Attached context
    /// carries over, sent markers do not.
    pub async fn start_new(&self) -> Result<String> {
        let flight = InFlight::acquire(&self.state).ok_or(NotebookError::PromptInFlight)?;
        let attached = {
            let mut state = self.state.borrow_mut();
            state.snapshot_current();
            state.context.attached()
        };

        let id = self.open_backend_session().await?;

        {
            let mut state = self.state.borrow_mut();
            let mut record = SessionRecord::new(&id, new_session_label(&id));
            record.context = ContextTracker::restore(attached, Vec::new());
            state.register(record);
            state.activate(&id);
        }
        log::info!("Session {} started", id);
        drop(flight);
        Ok(id)
    }

    async fn open_backend_session(&self) -> Result<String> {
        let id = match self.agent.create_session().await {
            Ok(id) => id,
            Err(e) => {
                let err = NotebookError::SessionCreation(e.detail());
                log::error!("{}", err);
                self.state.borrow_mut().append_working(Message::notice(&err));
                self.sync.sync(&self.state).await;
                return Err(err);
            }
        };
        self.apply_model(&id).await;
        Ok(id)
    }

    async fn apply_model(&self, session_id: &str) {
        let model = self.state.borrow().model;
        if model.is_auto() {
            return;
        }
        if let Err(e) = self.agent.set_model(session_id, model).await {
            log::warn!("Failed to set model {} on {}: {}", model.as_str(), session_id, e);
        }
    }

    // ─── Switching / closing ─────────────────────────────────

    pub fn switch_to(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.is_current(session_id) {
            return Ok(());
        }
        if state.is_in_flight() {
            return Err(NotebookError::PromptInFlight);
        }
        if !state.contains(session_id) {
            return Err(NotebookError::UnknownSession(session_id.to_string()));
        }
        state.snapshot_current();
        state.activate(session_id);
        Ok(())
    }

    /// Close a session. The backend release is best-effort; the session is
    /// removed either way. Closing the current session hands the pointer to
    /// the most recently opened remaining one.
    pub async fn close(&self, session_id: &str) {
        if let Err(e) = self.agent.close_session(session_id).await {
            log::warn!("Failed to close backend session {}: {}", session_id, e);
        }

        let mut state = self.state.borrow_mut();
        let was_current = state.is_current(session_id);
        state.remove(session_id);
        if !was_current {
            return;
        }
        let next = state.most_recent().map(|s| s.id.clone());
        match next {
            Some(next) => {
                state.activate(&next);
            }
            None => state.deactivate(),
        }
    }

    /// Forget the current workspace's working state. Open sessions stay
    /// registered but none is current.
    pub fn open_workspace(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.is_in_flight() {
            return Err(NotebookError::PromptInFlight);
        }
        state.snapshot_current();
        state.deactivate();
        Ok(())
    }

    // ─── History ─────────────────────────────────────────────

    /// Saved transcripts, newest first, labelled by their last update.
    pub async fn list_history(&self) -> Result<Vec<HistoryRecord>> {
        let mut records = self.sync.history().load_history().await?;
        for record in &mut records {
            record.label = record.display_label();
        }
        Ok(records)
    }

    /// Resume a saved conversation. When the backend hands back a different
    /// id, nothing has reached that conversation yet: the attachments and
    /// transcript are restored but the sent set starts empty, so the next
    /// prompt delivers every attached file again.
    pub async fn load_from_history(&self, saved: &HistoryRecord) -> Result<String> {
        let flight = InFlight::acquire(&self.state).ok_or(NotebookError::PromptInFlight)?;

        let id = match self.agent.load_session(&saved.session_id).await {
            Ok(id) => id,
            Err(e) => {
                let err = NotebookError::SessionLoad(e.detail());
                log::error!("{}", err);
                self.state.borrow_mut().append_working(Message::notice(&err));
                return Err(err);
            }
        };

        let resumed = id == saved.session_id;
        let sent = if resumed {
            saved.context_files.clone()
        } else {
            log::info!(
                "Backend issued {} for saved session {}; context will be resent",
                id,
                saved.session_id
            );
            Vec::new()
        };
        let label = if saved.label.is_empty() {
            new_session_label(&id)
        } else {
            saved.label.clone()
        };

        {
            let mut state = self.state.borrow_mut();
            state.snapshot_current();
            let mut record = SessionRecord::new(&id, label);
            record.messages = saved.messages.clone();
            record.context = ContextTracker::restore(saved.context_files.clone(), sent);
            state.register(record);
            state.activate(&id);
        }
        drop(flight);
        Ok(id)
    }

    // ─── Prompting ───────────────────────────────────────────

    /// Send user input to the current session, creating one if needed.
    /// Only context files not yet delivered to that session are attached.
    pub async fn send_message(&self, text: &str) -> Result<String> {
        let prompt = self.prepare_prompt(text).await?;
        self.run_prompt(prompt).await
    }

    /// First half of [`send_message`](Self::send_message): take the
    /// in-flight flag and resolve the target session. Callers that want to
    /// watch the stream subscribe to [`PendingPrompt::session_id`] before
    /// running it.
    pub async fn prepare_prompt(&self, text: &str) -> Result<PendingPrompt> {
        let text = text.trim();
        if text.is_empty() {
            return Err(NotebookError::Prompt("Message is empty".to_string()));
        }
        let flight = InFlight::acquire(&self.state).ok_or(NotebookError::PromptInFlight)?;
        let session_id = self.activate_or_create(&flight).await?;
        Ok(PendingPrompt {
            flight,
            session_id,
            text: text.to_string(),
        })
    }

    pub async fn run_prompt(&self, prompt: PendingPrompt) -> Result<String> {
        let PendingPrompt {
            flight,
            session_id,
            text,
        } = prompt;
        let delta = self
            .state
            .borrow()
            .context_of(&session_id)
            .map(ContextTracker::unsent_delta)
            .unwrap_or_default();
        self.runner.run(flight, &session_id, &text, delta).await
    }

    /// Ask the backend to stop the current prompt. Event subscriptions stay
    /// open until the runner sees the request resolve.
    pub async fn cancel(&self) -> Result<()> {
        let id = self.current_id().ok_or(NotebookError::NoActiveSession)?;
        if let Err(e) = self.agent.cancel_prompt(&id).await {
            log::warn!("Failed to cancel prompt on {}: {}", id, e);
        }
        Ok(())
    }

    pub async fn change_model(&self, model: ModelId) {
        self.state.borrow_mut().model = model;
        if let Some(id) = self.current_id() {
            self.apply_model(&id).await;
        }
    }

    // ─── Context ─────────────────────────────────────────────

    pub fn attach(&self, path: &str) {
        self.state.borrow_mut().context.attach(path);
    }

    /// Returns false when the path was already sent and stays attached.
    pub fn toggle_context(&self, path: &str) -> bool {
        self.state.borrow_mut().context.toggle(path)
    }

    pub async fn list_files(&self) -> Result<Vec<FileEntry>> {
        self.files.list_files().await
    }

    /// Select a file for preview: attaches it and returns its text, or the
    /// read error rendered inline.
    pub async fn preview(&self, path: &str) -> String {
        self.attach(path);
        match self.files.read_file_content(path).await {
            Ok(content) => content,
            Err(e) => format!("Error reading file: {}", e.detail()),
        }
    }
}
