use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use gemcrust_common::Result;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub use gemini::GeminiProvider;

/// Lazily produced sequence of response chunks. An `Err` item is terminal.
pub type ChunkStream = BoxStream<'static, Result<ResponseChunk>>;

/// Trait for generative backends that stream their output.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Provider identifier (e.g. "gemini").
    fn provider_id(&self) -> &str;

    /// Start a streamed generation for the given conversation contents.
    ///
    /// Errors returned here happen before any chunk was produced (transport
    /// failure, rejected request). Failures after that arrive as an `Err`
    /// item in the stream.
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream>;
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    /// Prior turns followed by the new user turn.
    pub contents: Vec<Content>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<InputPart>,
}

impl Content {
    pub fn user(parts: Vec<InputPart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![InputPart::Text(text.into())],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputPart {
    Text(String),
    /// Raw image bytes with their sniffed subtype (`jpeg`, `png`, ...).
    Image { subtype: String, data: Bytes },
}

impl InputPart {
    pub fn text(text: impl Into<String>) -> Self {
        InputPart::Text(text.into())
    }

    pub fn mime_type(&self) -> Option<String> {
        match self {
            InputPart::Text(_) => None,
            InputPart::Image { subtype, .. } => Some(format!("image/{subtype}")),
        }
    }
}

/// A unit of a streamed generation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseChunk {
    Text(String),
    /// The candidate reported why generation stopped.
    Finish(FinishReason),
    /// The backend answered without any candidate.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other(String),
}

impl FinishReason {
    pub fn from_api(raw: &str) -> Self {
        match raw {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" => FinishReason::Safety,
            "RECITATION" => FinishReason::Recitation,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => f.write_str("STOP"),
            FinishReason::MaxTokens => f.write_str("MAX_TOKENS"),
            FinishReason::Safety => f.write_str("SAFETY"),
            FinishReason::Recitation => f.write_str("RECITATION"),
            FinishReason::Other(raw) => f.write_str(raw),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmCategory {
    HarmCategoryHarassment,
    HarmCategoryHateSpeech,
    HarmCategorySexuallyExplicit,
    HarmCategoryDangerousContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

impl SafetySetting {
    /// All four harm categories set to no blocking.
    pub fn unfiltered() -> Vec<SafetySetting> {
        [
            HarmCategory::HarmCategoryHarassment,
            HarmCategory::HarmCategoryHateSpeech,
            HarmCategory::HarmCategorySexuallyExplicit,
            HarmCategory::HarmCategoryDangerousContent,
        ]
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: HarmBlockThreshold::BlockNone,
        })
        .collect()
    }
}
