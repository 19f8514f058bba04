use futures::{Stream, StreamExt};
use gemcrust_common::{Error, Result};
use tracing::{debug, warn};

use crate::providers::{FinishReason, ResponseChunk};

/// Placeholder used when the backend produced nothing at all.
pub const EMPTY_RESPONSE: &str = "response is empty";

/// Result of draining a chunk stream.
#[derive(Debug)]
pub struct AggregatedResponse {
    /// Text to deliver. Never empty.
    pub text: String,
    /// Model-generated text only, without notices.
    pub model_text: String,
    /// Error that ended the stream early, if any.
    pub error: Option<Error>,
}

impl AggregatedResponse {
    /// Response for a call that failed before the stream opened.
    pub fn from_error(error: Error) -> Self {
        let mut builder = Builder::default();
        builder.fail(error);
        builder.finish()
    }

    /// Whether any model-generated text arrived.
    pub fn produced_text(&self) -> bool {
        !self.model_text.is_empty()
    }

    /// True when the stream ran to completion and produced model text.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.produced_text()
    }
}

#[derive(Default)]
struct Builder {
    text: String,
    model_text: String,
    error: Option<Error>,
}

impl Builder {
    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
        self.model_text.push_str(text);
    }

    fn push_notice(&mut self, notice: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push_str("\n\n");
        }
        self.text.push_str(notice);
    }

    fn fail(&mut self, error: Error) {
        self.push_notice(&format!("[error: {error}]"));
        self.error = Some(error);
    }

    fn finish(mut self) -> AggregatedResponse {
        if self.text.is_empty() {
            self.text.push_str(EMPTY_RESPONSE);
        }
        AggregatedResponse {
            text: self.text,
            model_text: self.model_text,
            error: self.error,
        }
    }
}

/// Drain `stream` into a single response, preserving arrival order.
///
/// Returns once the stream is exhausted or yields an error. An error stops
/// the drain but keeps whatever text had already arrived.
pub async fn aggregate<S>(mut stream: S) -> AggregatedResponse
where
    S: Stream<Item = Result<ResponseChunk>> + Unpin,
{
    let mut builder = Builder::default();
    let mut chunks = 0usize;

    while let Some(item) = stream.next().await {
        chunks += 1;
        match item {
            Ok(ResponseChunk::Text(text)) => builder.push_text(&text),
            Ok(ResponseChunk::Finish(FinishReason::Stop)) => {}
            Ok(ResponseChunk::Finish(reason)) => {
                debug!(%reason, "candidate finished early");
                builder.push_notice(&format!("[finish reason: {reason}]"));
            }
            Ok(ResponseChunk::Empty) => builder.push_notice(EMPTY_RESPONSE),
            Err(e) => {
                warn!("response stream failed after {} chunk(s): {e}", chunks - 1);
                builder.fail(e);
                break;
            }
        }
    }

    builder.finish()
}
