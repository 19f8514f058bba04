use gemcrust_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_WAITING_TEXT: &str = "Waiting...";
pub const DEFAULT_PHOTO_PROMPT: &str = "Analyse these images and tell me what you see";
pub const DEFAULT_FINALIZE_PAUSE_MS: u64 = 200;

/// Telegram rejects text messages longer than this many UTF-16 code units.
pub const TELEGRAM_MAX_MESSAGE_CHARS: usize = 4096;

/// Top-level configuration, usually read from `gemcrust.yml` plus environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub gemini: GeminiConfig,
    pub bot: BotConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,

    /// Usernames (or numeric user ids) allowed to talk to the bot.
    /// Empty means everyone is allowed.
    pub allowed_users: Vec<String>,

    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
        }
    }
}

/// Behaviour knobs for the relay itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Placeholder text sent while the model is generating.
    pub waiting_text: String,

    /// Prompt sent alongside photos that arrive without a caption.
    pub photo_prompt: String,

    /// Pause after each finalized reply, to stay under platform rate limits.
    pub finalize_pause_ms: u64,

    /// Longer replies are split into several messages.
    pub max_message_chars: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            waiting_text: DEFAULT_WAITING_TEXT.to_string(),
            photo_prompt: DEFAULT_PHOTO_PROMPT.to_string(),
            finalize_pause_ms: DEFAULT_FINALIZE_PAUSE_MS,
            max_message_chars: TELEGRAM_MAX_MESSAGE_CHARS,
        }
    }
}

impl AppConfig {
    /// Check that the credentials needed to start are present.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::Config(
                "BOT_TOKEN must be set in environment variables, .env, or the config file".into(),
            ));
        }
        if self.gemini.api_key.trim().is_empty() {
            return Err(Error::Config(
                "GEMINI_API_KEY must be set in environment variables, .env, or the config file"
                    .into(),
            ));
        }
        if self.gemini.text_model.trim().is_empty() || self.gemini.vision_model.trim().is_empty()
        {
            return Err(Error::Config("gemini model names must not be empty".into()));
        }
        if self.bot.max_message_chars == 0 {
            return Err(Error::Config("bot.max_message_chars must be positive".into()));
        }
        Ok(())
    }
}
