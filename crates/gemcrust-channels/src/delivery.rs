use std::sync::Arc;
use std::time::Duration;

use gemcrust_common::{ChatId, MessageId, Result};
use gemcrust_config::BotConfig;
use tracing::{debug, error, warn};

use crate::format::{FormatMode, render, split_message};
use crate::traits::ChatPlatform;

/// An acknowledged turn waiting for its response text.
///
/// Consumed by [`DeliveryEngine::finalize`], so a placeholder is finalized
/// at most once.
#[derive(Debug)]
pub struct PendingDelivery {
    chat_id: ChatId,
    placeholder_id: MessageId,
    buffer: String,
}

impl PendingDelivery {
    pub fn new(chat_id: ChatId, placeholder_id: MessageId) -> Self {
        Self {
            chat_id,
            placeholder_id,
            buffer: String::new(),
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn placeholder_id(&self) -> MessageId {
        self.placeholder_id
    }

    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The placeholder was replaced. `mode` is the mode that was accepted for
    /// the first segment; `segments` counts the messages that made it.
    Delivered { mode: FormatMode, segments: usize },
    /// Every formatting mode was rejected; the placeholder is unchanged.
    Failed,
}

/// Two-phase delivery: a placeholder reply, then an in-place edit with the
/// final text, retried across [`FormatMode::FALLBACK_CHAIN`].
pub struct DeliveryEngine {
    platform: Arc<dyn ChatPlatform>,
    waiting_text: String,
    max_message_chars: usize,
    finalize_pause: Duration,
}

impl DeliveryEngine {
    pub fn new(platform: Arc<dyn ChatPlatform>, settings: &BotConfig) -> Self {
        Self {
            platform,
            waiting_text: settings.waiting_text.clone(),
            max_message_chars: settings.max_message_chars,
            finalize_pause: Duration::from_millis(settings.finalize_pause_ms),
        }
    }

    /// Reply to `reply_to` with the waiting text and show the typing
    /// indicator. A failed reply is returned to the caller, which should
    /// abandon the turn.
    pub async fn acknowledge(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
    ) -> Result<PendingDelivery> {
        let placeholder_id = self
            .platform
            .send_message(chat_id, &self.waiting_text, FormatMode::Plain, Some(reply_to))
            .await?;

        if let Err(e) = self.platform.send_typing(chat_id).await {
            debug!(chat_id = %chat_id, "typing indicator failed: {e}");
        }

        Ok(PendingDelivery::new(chat_id, placeholder_id))
    }

    /// Replace the placeholder with the buffered text.
    ///
    /// Text longer than the message ceiling is split; the first segment edits
    /// the placeholder and the rest are sent as new messages. Never returns an
    /// error: exhausting the fallback chain is logged and reported as
    /// [`DeliveryOutcome::Failed`].
    pub async fn finalize(&self, pending: PendingDelivery) -> DeliveryOutcome {
        let chat_id = pending.chat_id;
        let segments = split_message(&pending.buffer, self.max_message_chars);
        let mut segments = segments.iter();

        let first = segments.next().map(String::as_str).unwrap_or_default();
        let outcome = match self.edit_with_fallback(chat_id, pending.placeholder_id, first).await {
            Some(mode) => {
                let mut delivered = 1;
                for segment in segments {
                    if self.send_with_fallback(chat_id, segment).await.is_none() {
                        break;
                    }
                    delivered += 1;
                }
                DeliveryOutcome::Delivered {
                    mode,
                    segments: delivered,
                }
            }
            None => {
                error!(
                    chat_id = %chat_id,
                    message_id = %pending.placeholder_id,
                    "failed to deliver response in any format"
                );
                DeliveryOutcome::Failed
            }
        };

        if !self.finalize_pause.is_zero() {
            tokio::time::sleep(self.finalize_pause).await;
        }
        outcome
    }

    /// Edit `message_id` trying each mode once, stopping at the first
    /// accepted one.
    async fn edit_with_fallback(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> Option<FormatMode> {
        for mode in FormatMode::FALLBACK_CHAIN {
            let rendered = render(text, mode);
            match self
                .platform
                .edit_message(chat_id, message_id, &rendered, mode)
                .await
            {
                Ok(()) => return Some(mode),
                Err(e) => warn!(chat_id = %chat_id, %mode, "edit rejected: {e}"),
            }
        }
        None
    }

    async fn send_with_fallback(&self, chat_id: ChatId, text: &str) -> Option<FormatMode> {
        for mode in FormatMode::FALLBACK_CHAIN {
            let rendered = render(text, mode);
            match self
                .platform
                .send_message(chat_id, &rendered, mode, None)
                .await
            {
                Ok(_) => return Some(mode),
                Err(e) => warn!(chat_id = %chat_id, %mode, "send rejected: {e}"),
            }
        }
        error!(chat_id = %chat_id, "failed to send response segment in any format");
        None
    }
}
