pub mod aggregate;
pub mod engine;
pub mod media;
pub mod providers;
pub mod session;
pub mod session_store;

pub use aggregate::{AggregatedResponse, EMPTY_RESPONSE, aggregate};
pub use engine::{ConversationEngine, ModelRoster, ResetOutcome};
pub use media::{image_part, sniff_image_subtype};
pub use providers::{
    ChunkStream, Content, FinishReason, GeminiProvider, GenerateRequest, GenerativeBackend,
    HarmBlockThreshold, HarmCategory, InputPart, ResponseChunk, Role, SafetySetting,
};
pub use session::{ChatSession, SessionKey};
pub use session_store::{Resettable, SessionStore};
