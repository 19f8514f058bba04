use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MessageId};

/// A message pushed to the bot by the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender: Sender,
    /// Command token without the leading slash or `@botname` suffix.
    pub command: Option<String>,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Photo variants in the order the platform delivered them.
    pub photos: Vec<PhotoAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: u64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoAttachment {
    pub file_id: String,
    /// Size in bytes as reported by the platform.
    pub size: u32,
    pub width: u32,
    pub height: u32,
}

impl InboundEvent {
    pub fn text(
        chat_id: ChatId,
        message_id: MessageId,
        sender: Sender,
        text: impl Into<String>,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            sender,
            command: None,
            text: Some(text.into()),
            caption: None,
            photos: Vec::new(),
        }
    }

    pub fn command(
        chat_id: ChatId,
        message_id: MessageId,
        sender: Sender,
        command: impl Into<String>,
    ) -> Self {
        let command = command.into();
        Self {
            chat_id,
            message_id,
            sender,
            text: Some(format!("/{command}")),
            command: Some(command),
            caption: None,
            photos: Vec::new(),
        }
    }

    pub fn photo(
        chat_id: ChatId,
        message_id: MessageId,
        sender: Sender,
        photos: Vec<PhotoAttachment>,
        caption: Option<String>,
    ) -> Self {
        Self {
            chat_id,
            message_id,
            sender,
            command: None,
            text: None,
            caption,
            photos,
        }
    }

    /// True when the event carries something the bot can act on.
    pub fn has_payload(&self) -> bool {
        self.command.is_some()
            || !self.photos.is_empty()
            || self.text.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl Sender {
    pub fn new(user_id: u64, username: Option<&str>, first_name: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.map(str::to_string),
            first_name: first_name.into(),
        }
    }
}
