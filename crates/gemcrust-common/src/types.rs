use std::fmt;

use serde::{Deserialize, Serialize};

/// Platform conversation identifier. Negative for groups and channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single message inside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed backend modes a conversation can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Text,
    Vision,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Text, ModelVariant::Vision];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::Text => "text",
            ModelVariant::Vision => "vision",
        }
    }

    /// Whether sessions for this variant are kept between turns.
    ///
    /// Vision models are not tuned for multi-turn continuation, so each
    /// vision request starts from an empty history.
    pub fn keeps_history(&self) -> bool {
        matches!(self, ModelVariant::Text)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
