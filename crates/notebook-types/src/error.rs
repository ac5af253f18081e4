use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotebookError {
    #[error("Failed to create session: {0}")]
    SessionCreation(String),

    #[error("Failed to load session: {0}")]
    SessionLoad(String),

    #[error("Error: {0}")]
    Prompt(String),

    #[error("Error reading file: {0}")]
    Read(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("A prompt is already in flight")]
    PromptInFlight,

    #[error("Session not found: {0}")]
    UnknownSession(String),

    #[error("No active session")]
    NoActiveSession,

    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("ACP error: {0}")]
    Rpc(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl NotebookError {
    /// Underlying message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            NotebookError::SessionCreation(m)
            | NotebookError::SessionLoad(m)
            | NotebookError::Prompt(m)
            | NotebookError::Read(m)
            | NotebookError::Persistence(m)
            | NotebookError::UnknownSession(m)
            | NotebookError::InvalidSessionId(m)
            | NotebookError::Rpc(m)
            | NotebookError::Io(m)
            | NotebookError::Serialization(m)
            | NotebookError::Config(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for NotebookError {
    fn from(e: serde_json::Error) -> Self {
        NotebookError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for NotebookError {
    fn from(e: std::io::Error) -> Self {
        NotebookError::Io(e.to_string())
    }
}
