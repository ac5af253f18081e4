//! Stand-in agent for when no agent CLI is installed.

use std::cell::RefCell;
use std::collections::HashSet;

use async_trait::async_trait;
use notebook_core::event_bus::EventBus;
use notebook_core::ports::AgentPort;
use notebook_types::{model::ModelId, NotebookError, Result};

pub struct StubAgent {
    bus: EventBus,
    sessions: RefCell<HashSet<String>>,
}

impl StubAgent {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            sessions: RefCell::new(HashSet::new()),
        }
    }

    fn open(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.borrow_mut().insert(id.clone());
        id
    }
}

#[async_trait(?Send)]
impl AgentPort for StubAgent {
    async fn create_session(&self) -> Result<String> {
        Ok(self.open())
    }

    /// Nothing is kept between runs, so only sessions of this run resume.
    async fn load_session(&self, saved_id: &str) -> Result<String> {
        if self.sessions.borrow().contains(saved_id) {
            return Ok(saved_id.to_string());
        }
        Ok(self.open())
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        self.sessions.borrow_mut().remove(session_id);
        Ok(())
    }

    async fn set_model(&self, _session_id: &str, _model: ModelId) -> Result<()> {
        Ok(())
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        text: &str,
        context_paths: &[String],
    ) -> Result<String> {
        if !self.sessions.borrow().contains(session_id) {
            return Err(NotebookError::Prompt("Session not found".to_string()));
        }
        let reply = format!(
            "[Agent not available] Would ask: \"{}\" with {} new context file(s).\n\
             Hint: install Kiro CLI or pass --cli <path>.",
            text,
            context_paths.len()
        );
        for word in reply.split_inclusive(' ') {
            self.bus.publish_chunk(session_id, word);
        }
        Ok(reply)
    }

    async fn cancel_prompt(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }
}
