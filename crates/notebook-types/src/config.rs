use serde::{Deserialize, Serialize};

use crate::model::ModelId;

/// Top-level notebook configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookConfig {
    pub agent: AgentConfig,
    pub workspace: WorkspaceConfig,
    pub history: HistoryConfig,
    pub default_model: ModelId,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            workspace: WorkspaceConfig::default(),
            history: HistoryConfig::default(),
            default_model: ModelId::Auto,
        }
    }
}

/// How the agent backend process is launched and greeted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Path to the agent CLI; discovered when unset
    pub cli_path: Option<String>,
    pub args: Vec<String>,
    pub client_name: String,
    pub client_version: String,
    pub protocol_version: u32,
    /// Context file contents longer than this are truncated in prompts
    pub max_context_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cli_path: None,
            args: vec!["acp".to_string()],
            client_name: "kiro-notebook".to_string(),
            client_version: "0.1.0".to_string(),
            protocol_version: 1,
            max_context_chars: 50_000,
        }
    }
}

impl AgentConfig {
    /// Well-known install locations checked before falling back to `which`.
    pub fn cli_candidates(home: Option<&str>) -> Vec<String> {
        let mut candidates = vec!["/Applications/Kiro CLI.app/Contents/MacOS/kiro-cli".to_string()];
        if let Some(home) = home {
            candidates.push(format!("{}/.local/bin/kiro-cli", home));
        }
        candidates.push("/usr/local/bin/kiro-cli".to_string());
        candidates
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub extensions: Vec<String>,
    pub max_depth: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            extensions: ["pdf", "docx", "md", "txt", "html"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_depth: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory inside the workspace that holds saved transcripts
    pub dir_name: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir_name: ".kiro-notebook".to_string(),
        }
    }
}
