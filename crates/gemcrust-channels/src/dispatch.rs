use std::sync::Arc;

use gemcrust_agents::{ConversationEngine, InputPart, ResetOutcome, image_part};
use gemcrust_common::{InboundEvent, ModelVariant, PhotoAttachment, Result};
use gemcrust_config::BotConfig;
use gemcrust_security::Allowlist;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::delivery::DeliveryEngine;
use crate::format::FormatMode;
use crate::photos::select_largest_variants;
use crate::traits::ChatPlatform;

pub const NOT_ALLOWED_TEXT: &str = "You are not allowed to use this bot";
pub const HELP_TEXT: &str = "Commands: \n    /clear - Clear chat session\n    /help - Get help info\nJust send text or image to get response";
pub const INVALID_COMMAND_TEXT: &str = "Invalid command. Send /help to get help info";
pub const SESSION_CLEARED_TEXT: &str = "Chat session cleared.";
pub const NO_SESSION_TEXT: &str = "no chat session found, just send text or image";

/// Commands shown in the platform's command menu, with their descriptions.
pub const MENU_COMMANDS: [(&str, &str); 2] = [
    ("clear", "Clear previous contents and start a new chat"),
    ("help", "Get help info"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Clear,
    Unknown(String),
}

impl Command {
    /// Parse a command token such as `clear`, `/Clear` or `/clear@my_bot`.
    pub fn parse(raw: &str) -> Command {
        let name = raw.trim().trim_start_matches('/');
        let name = name.split('@').next().unwrap_or_default().to_ascii_lowercase();
        match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "clear" | "new" => Command::Clear,
            _ => Command::Unknown(name),
        }
    }
}

pub fn start_text(first_name: &str) -> String {
    format!("Hi! {first_name}, Welcome to Gemini Bot! Send /help to get help info")
}

/// Sequential consumer of inbound chat events.
pub struct DispatchLoop {
    engine: Arc<ConversationEngine>,
    platform: Arc<dyn ChatPlatform>,
    delivery: DeliveryEngine,
    allowlist: Allowlist,
    photo_prompt: String,
}

impl DispatchLoop {
    pub fn new(
        engine: Arc<ConversationEngine>,
        platform: Arc<dyn ChatPlatform>,
        allowlist: Allowlist,
        settings: &BotConfig,
    ) -> Self {
        Self {
            delivery: DeliveryEngine::new(Arc::clone(&platform), settings),
            engine,
            platform,
            allowlist,
            photo_prompt: settings.photo_prompt.clone(),
        }
    }

    /// Handle events one at a time until every sender is dropped.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<InboundEvent>) {
        info!(
            platform = self.platform.platform_id(),
            allowlist = self.allowlist.len(),
            "dispatch loop started"
        );
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("dispatch loop stopped");
    }

    #[instrument(
        skip(self, event),
        fields(chat_id = %event.chat_id, user_id = event.sender.user_id)
    )]
    pub async fn handle(&self, event: InboundEvent) {
        if !event.has_payload() {
            debug!("ignoring event without payload");
            return;
        }

        if !self.allowlist.permits(&event.sender) {
            info!(
                username = event.sender.username.as_deref().unwrap_or_default(),
                "sender is not allowed to use this bot"
            );
            self.reply(&event, NOT_ALLOWED_TEXT).await;
            return;
        }

        if let Some(raw) = event.command.as_deref() {
            self.handle_command(&event, Command::parse(raw)).await;
        } else if !event.photos.is_empty() {
            self.handle_photos(&event).await;
        } else if let Some(text) = event.text.as_deref() {
            let parts = vec![InputPart::text(text)];
            self.converse(&event, ModelVariant::Text, parts).await;
        }
    }

    async fn handle_command(&self, event: &InboundEvent, command: Command) {
        debug!(?command, "command received");
        let reply = match command {
            Command::Start => start_text(&event.sender.first_name),
            Command::Help => HELP_TEXT.to_string(),
            Command::Clear => match self.engine.reset(event.chat_id) {
                ResetOutcome::Cleared => SESSION_CLEARED_TEXT.to_string(),
                ResetOutcome::NothingToClear => NO_SESSION_TEXT.to_string(),
            },
            Command::Unknown(_) => INVALID_COMMAND_TEXT.to_string(),
        };
        self.reply(event, &reply).await;
    }

    async fn handle_photos(&self, event: &InboundEvent) {
        let mut pending = match self.delivery.acknowledge(event.chat_id, event.message_id).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("failed to send placeholder: {e}");
                return;
            }
        };

        let photos = select_largest_variants(&event.photos);
        let mut parts = match self.fetch_images(&photos).await {
            Ok(parts) => parts,
            Err(e) => {
                error!("failed to fetch photo: {e}");
                pending.push_str(&format!("[error: {e}]"));
                self.delivery.finalize(pending).await;
                return;
            }
        };

        let prompt = event
            .caption
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.photo_prompt);
        parts.push(InputPart::text(prompt));

        let response = self
            .engine
            .respond(event.chat_id, ModelVariant::Vision, parts)
            .await;
        pending.push_str(&response.text);
        self.delivery.finalize(pending).await;
    }

    async fn fetch_images(&self, photos: &[PhotoAttachment]) -> Result<Vec<InputPart>> {
        let mut parts = Vec::with_capacity(photos.len() + 1);
        for photo in photos {
            let url = self.platform.resolve_file_url(&photo.file_id).await?;
            let data = self.platform.download(&url).await?;
            debug!(file_id = %photo.file_id, bytes = data.len(), "photo downloaded");
            parts.push(image_part(data));
        }
        Ok(parts)
    }

    async fn converse(&self, event: &InboundEvent, variant: ModelVariant, parts: Vec<InputPart>) {
        let mut pending = match self.delivery.acknowledge(event.chat_id, event.message_id).await {
            Ok(pending) => pending,
            Err(e) => {
                error!("failed to send placeholder: {e}");
                return;
            }
        };

        let response = self.engine.respond(event.chat_id, variant, parts).await;
        pending.push_str(&response.text);
        self.delivery.finalize(pending).await;
    }

    async fn reply(&self, event: &InboundEvent, text: &str) {
        if let Err(e) = self
            .platform
            .send_message(event.chat_id, text, FormatMode::Plain, Some(event.message_id))
            .await
        {
            warn!("failed to send reply: {e}");
        }
    }
}
