use serde::{Deserialize, Serialize};

/// An incremental fragment of an in-progress assistant response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEvent {
    pub session_id: String,
    pub text: String,
}

/// Backend-side tool activity, unrelated to message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub update: StatusUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusUpdate {
    /// A tool invocation started
    ToolCall {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        status: Option<String>,
    },
    /// Progress or completion of a running tool invocation
    ToolUpdate {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        status: Option<String>,
    },
}

pub const DEFAULT_STATUS_TITLE: &str = "Working...";
const COMPLETED: &str = "completed";

impl StatusUpdate {
    /// What the status indicator should show after this update.
    /// `Some(text)` sets it, `Some("")` clears it, `None` leaves it as is.
    pub fn indicator(&self) -> Option<String> {
        match self {
            StatusUpdate::ToolCall { title, .. } => Some(
                title
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_STATUS_TITLE.to_string()),
            ),
            StatusUpdate::ToolUpdate { status } if status.as_deref() == Some(COMPLETED) => {
                Some(String::new())
            }
            StatusUpdate::ToolUpdate { .. } => None,
        }
    }
}
