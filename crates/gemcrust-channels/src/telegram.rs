use async_trait::async_trait;
use bytes::Bytes;
use gemcrust_common::{ChatId, Error, InboundEvent, MessageId, PhotoAttachment, Result, Sender};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatAction, FileId, LinkPreviewOptions, ReplyParameters};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::dispatch::MENU_COMMANDS;
use crate::format::FormatMode;
use crate::traits::{ChannelLifecycle, ChannelStatus, ChatPlatform};

/// Telegram "Group Anonymous Bot" used for anonymous group admins.
const ANONYMOUS_BOT_ID: u64 = 1087968824;

fn no_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

/// Outbound Telegram operations backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
    http: reqwest::Client,
}

impl TelegramPlatform {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    fn platform_id(&self) -> &str {
        "telegram"
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        mode: FormatMode,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        let mut request = self
            .bot
            .send_message(teloxide::types::ChatId(chat_id.0), text)
            .link_preview_options(no_link_preview());
        if let Some(parse_mode) = mode.parse_mode() {
            request = request.parse_mode(parse_mode);
        }
        if let Some(reply_to) = reply_to {
            let target = teloxide::types::MessageId(reply_to.0);
            request = request.reply_parameters(ReplyParameters::new(target));
        }

        let sent = request
            .await
            .map_err(|e| Error::Channel(format!("telegram send failed ({mode}): {e}")))?;
        Ok(MessageId(sent.id.0))
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        mode: FormatMode,
    ) -> Result<()> {
        let mut request = self
            .bot
            .edit_message_text(
                teloxide::types::ChatId(chat_id.0),
                teloxide::types::MessageId(message_id.0),
                text,
            )
            .link_preview_options(no_link_preview());
        if let Some(parse_mode) = mode.parse_mode() {
            request = request.parse_mode(parse_mode);
        }

        request
            .await
            .map_err(|e| Error::Channel(format!("telegram edit failed ({mode}): {e}")))?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        self.bot
            .send_chat_action(teloxide::types::ChatId(chat_id.0), ChatAction::Typing)
            .await
            .map_err(|e| Error::Channel(format!("telegram chat action failed: {e}")))?;
        Ok(())
    }

    async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| Error::Channel(format!("telegram get_file failed: {e}")))?;
        let api = self.bot.api_url();
        Ok(format!(
            "{}/file/bot{}/{}",
            api.as_str().trim_end_matches('/'),
            self.bot.token(),
            file.path
        ))
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Channel(format!("file download failed: {}", e.without_url())))?;
        response
            .bytes()
            .await
            .map_err(|e| Error::Channel(format!("file download failed: {}", e.without_url())))
    }
}

/// Command name of a `/command` text, lower-cased and without any
/// `@botname` suffix.
fn command_name(text: &str) -> Option<String> {
    let token = text.strip_prefix('/')?.split_whitespace().next()?;
    let name = token.split('@').next().unwrap_or_default();
    if name.is_empty() {
        return None;
    }
    Some(name.to_ascii_lowercase())
}

/// Convert a Telegram message into an [`InboundEvent`].
///
/// Returns None for messages that should be ignored: no sender (channel
/// posts) or sent by another bot. Photos win over text.
pub fn event_from_message(msg: &teloxide::types::Message) -> Option<InboundEvent> {
    let user = msg.from.as_ref()?;

    if user.is_bot && user.id.0 != ANONYMOUS_BOT_ID {
        return None;
    }

    let sender = Sender::new(user.id.0, user.username.as_deref(), user.first_name.clone());
    let chat_id = ChatId(msg.chat.id.0);
    let message_id = MessageId(msg.id.0);

    if let Some(sizes) = msg.photo() {
        let photos = sizes
            .iter()
            .map(|p| PhotoAttachment {
                file_id: p.file.id.0.clone(),
                size: p.file.size,
                width: p.width,
                height: p.height,
            })
            .collect();
        let caption = msg.caption().map(str::to_string);
        return Some(InboundEvent::photo(chat_id, message_id, sender, photos, caption));
    }

    let text = msg.text()?;
    match command_name(text) {
        Some(command) => Some(InboundEvent::command(chat_id, message_id, sender, command)),
        None => Some(InboundEvent::text(chat_id, message_id, sender, text)),
    }
}

/// Long-polls Telegram and forwards every relevant message to the dispatch
/// loop.
pub struct TelegramChannel {
    bot: Bot,
    display: String,
    status: ChannelStatus,
    events: mpsc::UnboundedSender<InboundEvent>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl TelegramChannel {
    pub fn new(bot: Bot, events: mpsc::UnboundedSender<InboundEvent>) -> Self {
        Self {
            bot,
            display: "Telegram".to_string(),
            status: ChannelStatus::Disconnected,
            events,
            shutdown_tx: None,
        }
    }

    /// Outbound handle sharing this channel's bot.
    pub fn platform(&self) -> TelegramPlatform {
        TelegramPlatform::new(self.bot.clone())
    }

    async fn register_commands(&self) {
        let commands: Vec<BotCommand> = MENU_COMMANDS
            .iter()
            .map(|(name, description)| BotCommand::new(*name, *description))
            .collect();
        if let Err(e) = self.bot.set_my_commands(commands).await {
            warn!("failed to register telegram commands: {e}");
        }
    }
}

#[async_trait]
impl ChannelLifecycle for TelegramChannel {
    fn display_name(&self) -> &str {
        &self.display
    }

    async fn connect(&mut self) -> Result<()> {
        let me = match self.bot.get_me().await {
            Ok(me) => me,
            Err(e) => {
                self.status = ChannelStatus::Error(e.to_string());
                return Err(Error::Channel(format!("telegram authorization failed: {e}")));
            }
        };
        info!(
            username = me.user.username.as_deref().unwrap_or_default(),
            "authorized on telegram"
        );

        self.register_commands().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let bot = self.bot.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let handler = Update::filter_message().endpoint(move |msg: teloxide::types::Message| {
                let events = events.clone();
                async move {
                    match event_from_message(&msg) {
                        Some(event) => {
                            debug!(chat_id = %event.chat_id, "telegram update queued");
                            if events.send(event).is_err() {
                                warn!("dispatch loop closed, dropping telegram update");
                            }
                        }
                        None => debug!(chat_id = msg.chat.id.0, "telegram update ignored"),
                    }
                    respond(())
                }
            });

            let mut dispatcher = Dispatcher::builder(bot, handler)
                .default_handler(|upd| async move {
                    tracing::trace!("unhandled update: {:?}", upd.kind);
                })
                .build();

            let token = dispatcher.shutdown_token();
            tokio::spawn(async move {
                let mut rx = shutdown_rx;
                while rx.changed().await.is_ok() {
                    if *rx.borrow() {
                        if let Err(e) = token.shutdown() {
                            warn!("telegram shutdown token error: {e:?}");
                        }
                        break;
                    }
                }
            });

            info!("telegram bot polling started");
            dispatcher.dispatch().await;
            info!("telegram bot polling stopped");
        });

        self.status = ChannelStatus::Connected;
        info!("telegram channel connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        self.status = ChannelStatus::Disconnected;
        info!("telegram channel disconnected");
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.status.clone()
    }
}
