use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NotebookError;

/// Models the agent backend can be switched to.
/// `Auto` leaves the choice to the backend and never issues a `setModel` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelId {
    #[default]
    Auto,
    Sonnet46,
    Opus46,
    Sonnet45,
    Opus45,
    Sonnet4,
    Haiku45,
}

impl ModelId {
    pub fn all() -> &'static [ModelId] {
        &[
            ModelId::Auto,
            ModelId::Sonnet46,
            ModelId::Opus46,
            ModelId::Sonnet45,
            ModelId::Opus45,
            ModelId::Sonnet4,
            ModelId::Haiku45,
        ]
    }

    /// Identifier sent to the backend
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Auto => "auto",
            ModelId::Sonnet46 => "claude-sonnet-4.6",
            ModelId::Opus46 => "claude-opus-4.6",
            ModelId::Sonnet45 => "claude-sonnet-4.5",
            ModelId::Opus45 => "claude-opus-4.5",
            ModelId::Sonnet4 => "claude-sonnet-4",
            ModelId::Haiku45 => "claude-haiku-4.5",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelId::Auto => "Auto",
            ModelId::Sonnet46 => "Sonnet 4.6",
            ModelId::Opus46 => "Opus 4.6",
            ModelId::Sonnet45 => "Sonnet 4.5",
            ModelId::Opus45 => "Opus 4.5",
            ModelId::Sonnet4 => "Sonnet 4",
            ModelId::Haiku45 => "Haiku 4.5",
        }
    }

    /// Credit cost relative to `Auto`
    pub fn cost_multiplier(&self) -> f32 {
        match self {
            ModelId::Auto => 1.0,
            ModelId::Sonnet46 | ModelId::Sonnet45 | ModelId::Sonnet4 => 1.3,
            ModelId::Opus46 | ModelId::Opus45 => 2.2,
            ModelId::Haiku45 => 0.4,
        }
    }

    pub fn is_auto(&self) -> bool {
        *self == ModelId::Auto
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}x)", self.label(), self.cost_multiplier())
    }
}

impl FromStr for ModelId {
    type Err = NotebookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| NotebookError::Config(format!("Unknown model: {}", s)))
    }
}

impl TryFrom<String> for ModelId {
    type Error = NotebookError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModelId> for String {
    fn from(m: ModelId) -> Self {
        m.as_str().to_string()
    }
}
