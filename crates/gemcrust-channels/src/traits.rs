use async_trait::async_trait;
use bytes::Bytes;
use gemcrust_common::{ChatId, MessageId, Result};
use serde::{Deserialize, Serialize};

use crate::format::FormatMode;

/// Lifecycle management for a messaging channel (connect, disconnect, status).
#[async_trait]
pub trait ChannelLifecycle: Send {
    /// Human-readable display name.
    fn display_name(&self) -> &str;

    /// Start receiving updates from the external service.
    async fn connect(&mut self) -> Result<()>;

    /// Stop receiving updates.
    async fn disconnect(&mut self) -> Result<()>;

    fn status(&self) -> ChannelStatus;
}

/// Outbound operations the relay needs from a chat platform.
///
/// Every call reports failure as an `Err`; callers decide whether it is
/// fatal for the current turn.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Unique identifier for this platform type.
    fn platform_id(&self) -> &str;

    /// Send a new message, optionally as a reply. `text` must already be
    /// rendered for `mode`.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        mode: FormatMode,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId>;

    /// Replace the content of an existing message. Link previews are
    /// disabled.
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        mode: FormatMode,
    ) -> Result<()>;

    /// Show the "typing" indicator in the conversation.
    async fn send_typing(&self, chat_id: ChatId) -> Result<()>;

    /// Resolve an attachment identifier to a direct download URL.
    async fn resolve_file_url(&self, file_id: &str) -> Result<String>;

    async fn download(&self, url: &str) -> Result<Bytes>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connected,
    Error(String),
}
