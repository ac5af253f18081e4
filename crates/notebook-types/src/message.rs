use serde::{Deserialize, Serialize};

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }

    /// Empty assistant message that a streaming response fills in.
    pub fn placeholder() -> Self {
        Self::assistant(String::new())
    }

    /// Visible error notice rendered as an assistant message.
    pub fn notice(text: impl std::fmt::Display) -> Self {
        Self::assistant(format!("❌ {}", text))
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
