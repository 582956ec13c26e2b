use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chat surface a conversation is rendered on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Surface {
    Panel,
    Inline,
    Other(String),
}

impl Surface {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Panel => "panel",
            Self::Inline => "inline",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Surface {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "panel" => Self::Panel,
            "inline" => Self::Inline,
            _ => Self::Other(value),
        }
    }
}

impl From<Surface> for String {
    fn from(value: Surface) -> Self {
        value.as_str().to_string()
    }
}

impl FromStr for Surface {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one independent interception slice: a conversation on a surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InterceptionKey {
    pub conversation_id: String,
    pub surface: Surface,
}

impl InterceptionKey {
    pub fn new(conversation_id: impl Into<String>, surface: Surface) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            surface,
        }
    }
}

impl fmt::Display for InterceptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.conversation_id, self.surface)
    }
}
