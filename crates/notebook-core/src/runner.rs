//! Streaming prompt runner: one prompt against one session.
//!
//! Per invocation: `Idle → Sending → Streaming → Done`, or
//! `Idle → Sending → Failed`.
//! 1. Append the user message and an empty assistant placeholder (visible
//!    before any backend traffic)
//! 2. Subscribe to the session's chunk and status streams
//! 3. Mark the delta as sent and issue the prompt with exactly that delta
//! 4. Apply events in arrival order until the request resolves, then drain
//!    whatever is still buffered
//! 5. Settle the placeholder: streamed text wins, then the returned text,
//!    then (on failure) a visible error notice

use std::cell::Cell;
use std::rc::Rc;

use futures::{select_biased, FutureExt, StreamExt};
use notebook_types::{
    event::{ChunkEvent, StatusEvent},
    message::Message,
    NotebookError, Result,
};

use crate::event_bus::EventBus;
use crate::persistence::PersistenceSync;
use crate::ports::AgentPort;
use crate::store::{InFlight, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Sending,
    Streaming,
    Done,
    Failed,
}

pub struct PromptRunner {
    state: SharedState,
    agent: Rc<dyn AgentPort>,
    bus: EventBus,
    sync: Rc<PersistenceSync>,
    phase: Cell<RunPhase>,
}

impl PromptRunner {
    pub fn new(
        state: SharedState,
        agent: Rc<dyn AgentPort>,
        bus: EventBus,
        sync: Rc<PersistenceSync>,
    ) -> Self {
        Self {
            state,
            agent,
            bus,
            sync,
            phase: Cell::new(RunPhase::Idle),
        }
    }

    /// Phase of the most recent invocation
    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    /// Run one prompt. `flight` is released when this returns, on every path.
    pub async fn run(
        &self,
        flight: InFlight,
        session_id: &str,
        text: &str,
        context_delta: Vec<String>,
    ) -> Result<String> {
        self.phase.set(RunPhase::Idle);
        {
            let mut state = self.state.borrow_mut();
            state.append(session_id, Message::user(text));
            state.append(session_id, Message::placeholder());
        }
        self.sync.sync(&self.state).await;

        let mut chunks = self.bus.subscribe_chunks(session_id).fuse();
        let mut status = self.bus.subscribe_status(session_id).fuse();

        // The files go out on the wire with this request, whatever the backend answers.
        if let Some(context) = self.state.borrow_mut().context_of_mut(session_id) {
            context.mark_sent(&context_delta);
        }

        log::info!(
            "Prompting {} with {} new context file(s)",
            session_id,
            context_delta.len()
        );
        self.phase.set(RunPhase::Sending);
        let mut streamed = false;
        let mut request = self
            .agent
            .send_prompt(session_id, text, &context_delta)
            .fuse();

        let result = loop {
            select_biased! {
                chunk = chunks.next() => {
                    if let Some(chunk) = chunk {
                        streamed |= self.apply_chunk(&chunk);
                        self.sync.sync(&self.state).await;
                    }
                }
                update = status.next() => {
                    if let Some(update) = update {
                        self.apply_status(&update);
                    }
                }
                result = request => break result,
            }
        };

        while let Some(chunk) = chunks.get_mut().try_next_event() {
            streamed |= self.apply_chunk(&chunk);
        }
        while let Some(update) = status.get_mut().try_next_event() {
            self.apply_status(&update);
        }
        drop(chunks);
        drop(status);

        match &result {
            Ok(final_text) => {
                if !streamed && !final_text.is_empty() {
                    self.state
                        .borrow_mut()
                        .fill_last_if_empty(session_id, final_text);
                }
                self.phase.set(RunPhase::Done);
            }
            Err(e) => {
                log::warn!("Prompt for {} failed: {}", session_id, e);
                let notice = Message::notice(failure_notice(e)).content;
                self.state
                    .borrow_mut()
                    .fill_last_if_empty(session_id, &notice);
                self.phase.set(RunPhase::Failed);
            }
        }

        self.sync.sync(&self.state).await;
        drop(flight);
        result
    }

    fn apply_chunk(&self, chunk: &ChunkEvent) -> bool {
        if chunk.text.is_empty() {
            return false;
        }
        if self.phase.get() == RunPhase::Sending {
            self.phase.set(RunPhase::Streaming);
        }
        self.state
            .borrow_mut()
            .extend_last(&chunk.session_id, &chunk.text)
    }

    fn apply_status(&self, event: &StatusEvent) {
        if let Some(text) = event.update.indicator() {
            self.state.borrow_mut().status_text = text;
        }
    }
}

/// Failures render as `Error: …` whatever layer raised them.
fn failure_notice(err: &NotebookError) -> NotebookError {
    match err {
        NotebookError::Prompt(_) => err.clone(),
        other => NotebookError::Prompt(other.to_string()),
    }
}
