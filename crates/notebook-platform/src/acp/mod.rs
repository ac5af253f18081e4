//! Agent backend over the Agent Client Protocol.
//!
//! Every session runs in its own `<cli> acp` child process, so a prompt
//! streaming on one session never blocks another. Streamed text and tool
//! activity are published on the shared [`EventBus`], scoped by session id.

mod connection;
pub mod prompt;
pub mod protocol;

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use async_trait::async_trait;
use notebook_core::event_bus::EventBus;
use notebook_core::ports::{AgentPort, FilesPort};
use notebook_types::{
    config::AgentConfig, model::ModelId, session::is_valid_session_id, NotebookError, Result,
};

use crate::workspace::WorkspaceRoot;
pub use connection::AcpConnection;
pub use prompt::compose_prompt;
use protocol::is_lock_conflict;

const CLI_NAME: &str = "kiro-cli";
const SESSION_LOCK_DIR: &str = ".kiro/sessions/cli";

pub struct AcpAgent {
    config: AgentConfig,
    cli_path: String,
    root: WorkspaceRoot,
    files: Rc<dyn FilesPort>,
    bus: EventBus,
    sessions: RefCell<HashMap<String, Rc<AcpConnection>>>,
}

impl AcpAgent {
    pub fn new(
        config: AgentConfig,
        cli_path: impl Into<String>,
        root: WorkspaceRoot,
        files: Rc<dyn FilesPort>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            cli_path: cli_path.into(),
            root,
            files,
            bus,
            sessions: RefCell::new(HashMap::new()),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.borrow().len()
    }

    fn cwd(&self) -> String {
        self.root.path().display().to_string()
    }

    fn connection(&self, session_id: &str) -> Result<Rc<AcpConnection>> {
        self.sessions
            .borrow()
            .get(session_id)
            .cloned()
            .ok_or_else(|| NotebookError::UnknownSession(session_id.to_string()))
    }

    fn insert(&self, session_id: &str, conn: AcpConnection) {
        self.sessions
            .borrow_mut()
            .insert(session_id.to_string(), Rc::new(conn));
    }

    async fn spawn_and_init(&self) -> Result<AcpConnection> {
        let conn = AcpConnection::spawn(&self.cli_path, &self.config.args, self.bus.clone())?;
        conn.initialize(&self.config).await?;
        Ok(conn)
    }

    async fn resume(&self, session_id: &str) -> Result<AcpConnection> {
        let conn = self.spawn_and_init().await?;
        conn.load_session(session_id, &self.cwd()).await?;
        Ok(conn)
    }

    /// Resume, clearing a lock left behind by a dead process once.
    async fn resume_with_lock_recovery(&self, session_id: &str) -> Result<AcpConnection> {
        match self.resume(session_id).await {
            Err(e) if is_lock_conflict(&e) => {
                remove_stale_lock(session_id).await;
                self.resume(session_id).await
            }
            other => other,
        }
    }
}

#[async_trait(?Send)]
impl AgentPort for AcpAgent {
    async fn create_session(&self) -> Result<String> {
        let conn = self.spawn_and_init().await?;
        let id = conn.new_session(&self.cwd()).await?;
        log::info!("ACP session created: {}", id);
        self.insert(&id, conn);
        Ok(id)
    }

    /// A session the backend can no longer resume is replaced by a fresh
    /// one; the caller sees the different id.
    async fn load_session(&self, saved_id: &str) -> Result<String> {
        if self.sessions.borrow().contains_key(saved_id) {
            return Ok(saved_id.to_string());
        }
        if !is_valid_session_id(saved_id) {
            return Err(NotebookError::InvalidSessionId(saved_id.to_string()));
        }
        match self.resume_with_lock_recovery(saved_id).await {
            Ok(conn) => {
                log::info!("ACP session resumed: {}", saved_id);
                self.insert(saved_id, conn);
                Ok(saved_id.to_string())
            }
            Err(e) => {
                log::warn!("Cannot resume {} ({}), starting a new session", saved_id, e);
                self.create_session().await
            }
        }
    }

    async fn close_session(&self, session_id: &str) -> Result<()> {
        let conn = self.sessions.borrow_mut().remove(session_id);
        if let Some(conn) = conn {
            conn.kill();
            log::info!("ACP session closed: {}", session_id);
        }
        Ok(())
    }

    async fn set_model(&self, session_id: &str, model: ModelId) -> Result<()> {
        self.connection(session_id)?
            .set_model(session_id, model.as_str())
            .await
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        text: &str,
        context_paths: &[String],
    ) -> Result<String> {
        let conn = self.connection(session_id)?;
        let prompt = compose_prompt(
            self.files.as_ref(),
            text,
            context_paths,
            self.config.max_context_chars,
        )
        .await;
        conn.prompt(session_id, &prompt).await
    }

    async fn cancel_prompt(&self, session_id: &str) -> Result<()> {
        self.connection(session_id)?.cancel(session_id).await
    }
}

/// Lock file the agent CLI keeps while a process owns a session.
pub fn stale_lock_path(home: &Path, session_id: &str) -> PathBuf {
    home.join(SESSION_LOCK_DIR)
        .join(format!("{}.lock", session_id))
}

async fn remove_stale_lock(session_id: &str) {
    let Some(home) = dirs::home_dir() else {
        log::warn!("Cannot locate home directory to clear session lock");
        return;
    };
    let path = stale_lock_path(&home, session_id);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => log::info!("Removed stale lock {}", path.display()),
        Err(e) => log::debug!("No stale lock at {}: {}", path.display(), e),
    }
}

/// Locate the agent CLI: configured path, well-known install locations,
/// then `which`.
pub async fn find_cli(config: &AgentConfig) -> Result<String> {
    if let Some(path) = &config.cli_path {
        return if Path::new(path).exists() {
            Ok(path.clone())
        } else {
            Err(NotebookError::Config(format!("Agent CLI not found at {}", path)))
        };
    }

    let home = dirs::home_dir().map(|h| h.display().to_string());
    if let Some(found) = AgentConfig::cli_candidates(home.as_deref())
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        return Ok(found);
    }

    if let Ok(output) = tokio::process::Command::new("which").arg(CLI_NAME).output().await {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() && Path::new(&path).exists() {
            return Ok(path);
        }
    }

    Err(NotebookError::Config(format!(
        "{} not found. Please install Kiro CLI.",
        CLI_NAME
    )))
}
