use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::message::Message;

const LABEL_ID_PREFIX: usize = 8;
const LABEL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A persisted conversation, as written by the history service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub session_id: String,
    pub label: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Context files already delivered to the backend session
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub updated_at: String,
}

impl HistoryRecord {
    pub fn new(
        session_id: impl Into<String>,
        label: impl Into<String>,
        messages: Vec<Message>,
        context_files: Vec<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            label: label.into(),
            messages,
            context_files,
            updated_at: String::new(),
        }
    }

    /// Label shown in the history list: last update time when known,
    /// otherwise the label stored with the record.
    pub fn display_label(&self) -> String {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|t| session_label(&self.session_id, t.with_timezone(&Local)))
            .unwrap_or_else(|_| self.label.clone())
    }
}

/// `<local time> · <first 8 chars of id>`
pub fn session_label(session_id: &str, at: DateTime<Local>) -> String {
    let prefix: String = session_id.chars().take(LABEL_ID_PREFIX).collect();
    format!("{} · {}", at.format(LABEL_TIME_FORMAT), prefix)
}

/// Label for a session created now.
pub fn new_session_label(session_id: &str) -> String {
    session_label(session_id, Local::now())
}

/// Session ids become file names, so only allow a safe character set.
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
