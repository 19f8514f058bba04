use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gemcrust_agents::{ConversationEngine, GeminiProvider, ModelRoster, SessionStore};
use gemcrust_channels::{ChannelLifecycle, ChatPlatform, DispatchLoop, TelegramChannel};
use gemcrust_config::{AppConfig, ConfigLoader};
use gemcrust_security::{Allowlist, RedactingWriter};
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long queued messages may take to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "gemcrust", version, about = "Relay Telegram chats to Gemini")]
struct Args {
    /// YAML config file. Defaults to ./gemcrust.yml when present.
    #[arg(short, long, env = "GEMCRUST_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging regardless of BOT_DEBUG_MODE.
    #[arg(long)]
    debug: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(debug: bool, format: LogFormat) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr());

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_engine(config: &AppConfig) -> ConversationEngine {
    let provider = GeminiProvider::new(config.gemini.api_key.clone())
        .with_base_url(config.gemini.base_url.clone());
    ConversationEngine::new(
        Arc::new(provider),
        Arc::new(SessionStore::new()),
        ModelRoster {
            text: config.gemini.text_model.clone(),
            vision: config.gemini.vision_model.clone(),
        },
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, sources) = ConfigLoader::new(args.config.clone())
        .load()
        .context("failed to load configuration")?;
    config.telegram.debug |= args.debug;

    init_tracing(config.telegram.debug, args.log_format);
    sources.log();
    info!(
        text_model = %config.gemini.text_model,
        vision_model = %config.gemini.vision_model,
        debug = config.telegram.debug,
        "starting gemcrust"
    );

    let allowlist = Allowlist::new(&config.telegram.allowed_users);
    if allowlist.is_open() {
        warn!("ALLOWED_USERS is empty, every Telegram user can talk to the bot");
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut channel = TelegramChannel::new(Bot::new(&config.telegram.bot_token), events_tx);
    let platform: Arc<dyn ChatPlatform> = Arc::new(channel.platform());

    let dispatch = DispatchLoop::new(
        Arc::new(build_engine(&config)),
        platform,
        allowlist,
        &config.bot,
    );
    let dispatch_task = tokio::spawn(async move { dispatch.run(events_rx).await });

    channel
        .connect()
        .await
        .context("failed to start telegram channel")?;
    info!("{} channel ready, press Ctrl-C to stop", channel.display_name());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    channel.disconnect().await?;
    drop(channel);

    if tokio::time::timeout(DRAIN_TIMEOUT, dispatch_task).await.is_err() {
        warn!("dispatch loop did not drain within {DRAIN_TIMEOUT:?}");
    }
    info!("gemcrust stopped");
    Ok(())
}
