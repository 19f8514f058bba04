use std::path::{Path, PathBuf};

use gemcrust_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const DEFAULT_CONFIG_FILE: &str = "gemcrust.yml";

/// Where a loaded configuration came from.
///
/// Loading usually happens before logging is set up, so the loader records
/// its sources here and the caller logs them afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub env_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl ConfigSources {
    pub fn log(&self) {
        match &self.env_file {
            Some(path) => info!("loaded environment from {}", path.display()),
            None => info!("no .env file found, reading configuration from environment"),
        }
        match &self.config_file {
            Some(path) => info!("loaded config from {}", path.display()),
            None => debug!("no {DEFAULT_CONFIG_FILE} in working directory"),
        }
    }
}

/// Loads [`AppConfig`] from `.env`, an optional YAML file, and the process
/// environment, in that order of increasing precedence.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Load and validate the configuration.
    pub fn load(&self) -> Result<(AppConfig, ConfigSources)> {
        let env_file = dotenvy::dotenv().ok();
        self.resolve(env_file, |key| std::env::var(key).ok())
    }

    /// Build the configuration from the YAML file and `lookup`, once `.env`
    /// has been applied to the environment.
    pub fn resolve<F>(
        &self,
        env_file: Option<PathBuf>,
        lookup: F,
    ) -> Result<(AppConfig, ConfigSources)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_file = self.config_path();
        let mut config = match &config_file {
            Some(path) => Self::from_file(path)?,
            None => AppConfig::default(),
        };

        apply_env_overrides(&mut config, lookup);
        config.validate()?;
        Ok((config, ConfigSources { env_file, config_file }))
    }

    /// Parse a YAML config file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config: AppConfig = serde_yaml::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        Ok(config)
    }

    /// Explicit path if given, otherwise `gemcrust.yml` in the working
    /// directory when it exists.
    fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return Some(path.clone());
        }
        let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
        fallback.is_file().then_some(fallback)
    }
}

/// Overlay environment variables onto `config`. Unset and empty variables
/// leave the existing value alone.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("BOT_TOKEN").or_else(|| get("TELEGRAM_BOT_TOKEN")) {
        config.telegram.bot_token = token;
    }
    if let Some(users) = get("ALLOWED_USERS") {
        config.telegram.allowed_users = parse_list(&users);
    }
    if let Some(flag) = get("BOT_DEBUG_MODE") {
        config.telegram.debug = flag.trim().eq_ignore_ascii_case("true");
    }
    if let Some(key) = get("GEMINI_API_KEY") {
        config.gemini.api_key = key;
    }
    if let Some(model) = get("GEMINI_TEXT_MODEL") {
        config.gemini.text_model = model;
    }
    if let Some(model) = get("GEMINI_VISION_MODEL") {
        config.gemini.vision_model = model;
    }
    if let Some(url) = get("GEMINI_BASE_URL") {
        config.gemini.base_url = url.trim_end_matches('/').to_string();
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
