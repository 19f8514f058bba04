use std::sync::Arc;

use gemcrust_common::{ChatId, ModelVariant};
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{AggregatedResponse, aggregate};
use crate::providers::{Content, GenerateRequest, GenerativeBackend, InputPart};
use crate::session::{ChatSession, SessionKey};
use crate::session_store::SessionStore;

/// Model identifiers for each variant.
#[derive(Debug, Clone)]
pub struct ModelRoster {
    pub text: String,
    pub vision: String,
}

impl ModelRoster {
    pub fn model_for(&self, variant: ModelVariant) -> &str {
        match variant {
            ModelVariant::Text => &self.text,
            ModelVariant::Vision => &self.vision,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Cleared,
    NothingToClear,
}

/// Maps conversations to sessions and turns a user input into a response.
pub struct ConversationEngine {
    backend: Arc<dyn GenerativeBackend>,
    sessions: Arc<SessionStore<ChatSession>>,
    models: ModelRoster,
}

impl ConversationEngine {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        sessions: Arc<SessionStore<ChatSession>>,
        models: ModelRoster,
    ) -> Self {
        Self {
            backend,
            sessions,
            models,
        }
    }

    pub fn sessions(&self) -> &SessionStore<ChatSession> {
        &self.sessions
    }

    /// Session to use for this chat and variant.
    ///
    /// Text sessions live in the store; vision sessions are built per call
    /// and never stored.
    pub fn session_for(&self, chat_id: ChatId, variant: ModelVariant) -> Arc<ChatSession> {
        let model = self.models.model_for(variant);
        if !variant.keeps_history() {
            return Arc::new(ChatSession::new(variant, model));
        }
        let key = SessionKey::derive(chat_id, variant);
        self.sessions
            .get_or_create(key, || ChatSession::new(variant, model))
    }

    /// Send `input` within the chat's session and drain the streamed reply.
    ///
    /// Does not return until the stream is exhausted or has failed. History
    /// is only extended when the reply completed with model text.
    #[instrument(
        skip(self, input),
        fields(chat_id = %chat_id, variant = %variant, parts = input.len())
    )]
    pub async fn respond(
        &self,
        chat_id: ChatId,
        variant: ModelVariant,
        input: Vec<InputPart>,
    ) -> AggregatedResponse {
        let session = self.session_for(chat_id, variant);

        let mut contents = session.history();
        debug!(history = contents.len(), "sending turn");
        contents.push(Content::user(input.clone()));

        let request = GenerateRequest {
            model: session.model().to_string(),
            contents,
        };

        let stream = match self.backend.stream_generate(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(provider = self.backend.provider_id(), "generation failed: {e}");
                return AggregatedResponse::from_error(e);
            }
        };

        let response = aggregate(stream).await;
        if response.is_complete() {
            let reply = Content::model_text(response.model_text.clone());
            session.record_turn(Content::user(input), reply);
        }
        response
    }

    /// Clear both the text and vision sessions for `chat_id`.
    pub fn reset(&self, chat_id: ChatId) -> ResetOutcome {
        let mut cleared = false;
        for variant in ModelVariant::ALL {
            cleared |= self.sessions.clear(&SessionKey::derive(chat_id, variant));
        }
        if cleared {
            info!(chat_id = %chat_id, "chat session cleared");
            ResetOutcome::Cleared
        } else {
            ResetOutcome::NothingToClear
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ChunkStream, FinishReason, ResponseChunk};
    use async_trait::async_trait;
    use futures::stream;
    use gemcrust_common::{Error, Result};
    use std::sync::Mutex;

    /// Replies with fixed chunks and records every request it sees.
    struct ScriptedBackend {
        reply: Vec<&'static str>,
        finish: FinishReason,
        fail_open: bool,
        fail_mid_stream: bool,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedBackend {
        fn replying(reply: Vec<&'static str>) -> Self {
            Self {
                reply,
                finish: FinishReason::Stop,
                fail_open: false,
                fail_mid_stream: false,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<GenerateRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeBackend for ScriptedBackend {
        fn provider_id(&self) -> &str {
            "scripted"
        }

        async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_open {
                return Err(Error::Agent("backend unavailable".into()));
            }
            let mut items: Vec<Result<ResponseChunk>> = self
                .reply
                .iter()
                .map(|t| Ok(ResponseChunk::Text(t.to_string())))
                .collect();
            if self.fail_mid_stream {
                items.push(Err(Error::Agent("stream cut".into())));
            } else {
                items.push(Ok(ResponseChunk::Finish(self.finish.clone())));
            }
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn engine(backend: Arc<ScriptedBackend>) -> ConversationEngine {
        ConversationEngine::new(
            backend,
            Arc::new(SessionStore::new()),
            ModelRoster {
                text: "text-model".into(),
                vision: "vision-model".into(),
            },
        )
    }

    #[tokio::test]
    async fn text_turns_accumulate_history() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["Hello, ", "world"]));
        let engine = engine(Arc::clone(&backend));

        let first = engine
            .respond(ChatId(1), ModelVariant::Text, vec![InputPart::text("hi")])
            .await;
        assert_eq!(first.text, "Hello, world");

        engine
            .respond(ChatId(1), ModelVariant::Text, vec![InputPart::text("again")])
            .await;

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, "text-model");
        assert_eq!(requests[0].contents.len(), 1);
        assert_eq!(requests[1].contents.len(), 3);
        assert_eq!(requests[1].contents[1], Content::model_text("Hello, world"));
    }

    #[tokio::test]
    async fn vision_sessions_are_not_stored() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["a cat"]));
        let engine = engine(Arc::clone(&backend));

        for _ in 0..2 {
            engine
                .respond(ChatId(5), ModelVariant::Vision, vec![InputPart::text("look")])
                .await;
        }

        let requests = backend.requests();
        assert!(requests.iter().all(|r| r.contents.len() == 1));
        assert_eq!(requests[0].model, "vision-model");
        assert!(engine.sessions().is_empty());
    }

    #[tokio::test]
    async fn chats_do_not_share_history() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["ok"]));
        let engine = engine(Arc::clone(&backend));

        engine
            .respond(ChatId(1), ModelVariant::Text, vec![InputPart::text("one")])
            .await;
        engine
            .respond(ChatId(2), ModelVariant::Text, vec![InputPart::text("two")])
            .await;

        assert_eq!(backend.requests()[1].contents.len(), 1);
        assert_eq!(engine.sessions().len(), 2);
    }

    #[tokio::test]
    async fn failed_stream_does_not_extend_history() {
        let backend = Arc::new(ScriptedBackend {
            fail_mid_stream: true,
            ..ScriptedBackend::replying(vec!["partial"])
        });
        let engine = engine(Arc::clone(&backend));

        let response = engine
            .respond(ChatId(3), ModelVariant::Text, vec![InputPart::text("q")])
            .await;

        assert!(response.text.starts_with("partial"));
        assert!(response.error.is_some());
        assert_eq!(engine.session_for(ChatId(3), ModelVariant::Text).history_len(), 0);
    }

    #[tokio::test]
    async fn history_keeps_model_text_without_notices() {
        let backend = Arc::new(ScriptedBackend {
            finish: FinishReason::MaxTokens,
            ..ScriptedBackend::replying(vec!["partial"])
        });
        let engine = engine(Arc::clone(&backend));

        let response = engine
            .respond(ChatId(6), ModelVariant::Text, vec![InputPart::text("q")])
            .await;
        assert_eq!(response.text, "partial\n\n[finish reason: MAX_TOKENS]");

        engine
            .respond(ChatId(6), ModelVariant::Text, vec![InputPart::text("go on")])
            .await;
        assert_eq!(backend.requests()[1].contents[1], Content::model_text("partial"));
    }

    #[tokio::test]
    async fn open_failure_becomes_deliverable_text() {
        let backend = Arc::new(ScriptedBackend {
            fail_open: true,
            ..ScriptedBackend::replying(vec![])
        });
        let engine = engine(backend);

        let response = engine
            .respond(ChatId(4), ModelVariant::Text, vec![InputPart::text("q")])
            .await;
        assert_eq!(response.text, "[error: agent error: backend unavailable]");
    }

    #[tokio::test]
    async fn reset_reports_whether_anything_was_cleared() {
        let backend = Arc::new(ScriptedBackend::replying(vec!["ok"]));
        let engine = engine(backend);

        assert_eq!(engine.reset(ChatId(9)), ResetOutcome::NothingToClear);

        engine
            .respond(ChatId(9), ModelVariant::Text, vec![InputPart::text("hi")])
            .await;
        assert_eq!(engine.reset(ChatId(9)), ResetOutcome::Cleared);
        assert_eq!(engine.session_for(ChatId(9), ModelVariant::Text).history_len(), 0);
    }
}
