pub mod error;
pub mod message;
pub mod types;

pub use error::{Error, Result};
pub use message::{InboundEvent, PhotoAttachment, Sender};
pub use types::{ChatId, MessageId, ModelVariant};
