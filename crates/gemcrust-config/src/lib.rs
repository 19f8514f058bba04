pub mod loader;
pub mod model;

pub use loader::{ConfigLoader, ConfigSources};
pub use model::{AppConfig, BotConfig, GeminiConfig, TelegramConfig};
