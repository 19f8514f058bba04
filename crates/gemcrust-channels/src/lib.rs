pub mod delivery;
pub mod dispatch;
pub mod format;
pub mod photos;
pub mod telegram;
pub mod traits;

#[cfg(test)]
mod testing;

pub use delivery::{DeliveryEngine, DeliveryOutcome, PendingDelivery};
pub use dispatch::{Command, DispatchLoop};
pub use format::{FormatMode, render, split_message, to_telegram_markdown};
pub use photos::select_largest_variants;
pub use telegram::{TelegramChannel, TelegramPlatform, event_from_message};
pub use traits::{ChannelLifecycle, ChannelStatus, ChatPlatform};
