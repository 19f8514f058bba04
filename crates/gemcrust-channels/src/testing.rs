//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use gemcrust_agents::{
    ChunkStream, FinishReason, GenerateRequest, GenerativeBackend, InputPart, ResponseChunk,
};
use gemcrust_common::{ChatId, Error, MessageId, Result};

use crate::format::FormatMode;
use crate::traits::ChatPlatform;

#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCall {
    Send {
        chat_id: ChatId,
        text: String,
        mode: FormatMode,
        reply_to: Option<MessageId>,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        mode: FormatMode,
    },
    Typing {
        chat_id: ChatId,
    },
    ResolveFile {
        file_id: String,
    },
    Download {
        url: String,
    },
}

/// Records every call; failures are configured per operation.
#[derive(Default)]
pub struct RecordingPlatform {
    fail_sends: bool,
    rejected_edit_modes: Vec<FormatMode>,
    /// Downloadable content keyed by file id. Unknown ids fail to resolve.
    files: HashMap<String, Bytes>,
    calls: Mutex<Vec<PlatformCall>>,
    sent_ids: Mutex<Vec<MessageId>>,
}

impl RecordingPlatform {
    /// A platform that refuses every outbound message.
    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    /// A platform that rejects edits in the given modes.
    pub fn rejecting(modes: impl IntoIterator<Item = FormatMode>) -> Self {
        Self {
            rejected_edit_modes: modes.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_file(mut self, file_id: &str, data: Bytes) -> Self {
        self.files.insert(file_id.to_string(), data);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Every edit attempt, accepted or not.
    pub fn edits(&self) -> Vec<(FormatMode, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Edit { mode, text, .. } => Some((mode, text)),
                _ => None,
            })
            .collect()
    }

    /// Texts of messages sent as replies.
    pub fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Send {
                    text,
                    reply_to: Some(_),
                    ..
                } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn last_sent_id(&self) -> Option<MessageId> {
        self.sent_ids.lock().unwrap().last().copied()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    fn platform_id(&self) -> &str {
        "recording"
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        mode: FormatMode,
        reply_to: Option<MessageId>,
    ) -> Result<MessageId> {
        self.record(PlatformCall::Send {
            chat_id,
            text: text.to_string(),
            mode,
            reply_to,
        });
        if self.fail_sends {
            return Err(Error::Channel("send refused".into()));
        }
        let mut ids = self.sent_ids.lock().unwrap();
        let id = MessageId(1000 + ids.len() as i32);
        ids.push(id);
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        mode: FormatMode,
    ) -> Result<()> {
        self.record(PlatformCall::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            mode,
        });
        if self.rejected_edit_modes.contains(&mode) {
            return Err(Error::Channel(format!("can't parse entities in {mode}")));
        }
        Ok(())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        self.record(PlatformCall::Typing { chat_id });
        Ok(())
    }

    async fn resolve_file_url(&self, file_id: &str) -> Result<String> {
        self.record(PlatformCall::ResolveFile {
            file_id: file_id.to_string(),
        });
        if self.files.contains_key(file_id) {
            Ok(format!("https://files.test/{file_id}"))
        } else {
            Err(Error::Channel(format!("file {file_id} not found")))
        }
    }

    async fn download(&self, url: &str) -> Result<Bytes> {
        self.record(PlatformCall::Download {
            url: url.to_string(),
        });
        let file_id = url.trim_start_matches("https://files.test/");
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| Error::Channel(format!("download of {url} failed")))
    }
}

/// Replies `echo: <text parts of the last turn>` and records requests.
#[derive(Default)]
pub struct EchoBackend {
    requests: Mutex<Vec<GenerateRequest>>,
}

impl EchoBackend {
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for EchoBackend {
    fn provider_id(&self) -> &str {
        "echo"
    }

    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        let said: Vec<String> = request
            .contents
            .last()
            .map(|turn| {
                turn.parts
                    .iter()
                    .filter_map(|part| match part {
                        InputPart::Text(text) => Some(text.clone()),
                        InputPart::Image { .. } => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let items: Vec<Result<ResponseChunk>> = vec![
            Ok(ResponseChunk::Text(format!("echo: {}", said.join(" ")))),
            Ok(ResponseChunk::Finish(FinishReason::Stop)),
        ];
        Ok(Box::pin(stream::iter(items)))
    }
}
