use super::{
    ChunkStream, Content, FinishReason, GenerateRequest, GenerativeBackend, InputPart,
    ResponseChunk, Role, SafetySetting,
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use gemcrust_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, instrument};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Streams completions from the Gemini `streamGenerateContent` endpoint.
pub struct GeminiProvider {
    api_key: String,
    client: Client,
    base_url: String,
    safety_settings: Vec<SafetySetting>,
}

impl GeminiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: GEMINI_API_URL.to_string(),
            safety_settings: SafetySetting::unfiltered(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    fn build_request_body(&self, request: &GenerateRequest) -> Result<serde_json::Value> {
        let body = RequestBody {
            contents: request.contents.iter().map(ApiContent::from).collect(),
            safety_settings: &self.safety_settings,
        };
        Ok(serde_json::to_value(body)?)
    }
}

#[async_trait]
impl GenerativeBackend for GeminiProvider {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    #[instrument(
        skip(self, request),
        fields(model = %request.model, turns = request.contents.len())
    )]
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<ChunkStream> {
        let body = self.build_request_body(request)?;

        let response = self
            .client
            .post(self.stream_url(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Agent(describe_http_error(status, &error_text)));
        }
        debug!("gemini stream opened");

        let bytes = response.bytes_stream().fuse().boxed();
        let s = stream::try_unfold(
            (bytes, Vec::new(), VecDeque::new()),
            |(mut bytes, mut buffer, mut pending): SseState| async move {
                loop {
                    if let Some(chunk) = pending.pop_front() {
                        return Ok(Some((chunk, (bytes, buffer, pending))));
                    }

                    if let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=i).collect();
                        pending.extend(parse_sse_line(&line)?);
                        continue;
                    }

                    match bytes.next().await {
                        Some(Ok(data)) => buffer.extend_from_slice(&data),
                        Some(Err(e)) => {
                            return Err(Error::Agent(format!("gemini stream error: {e}")));
                        }
                        None => {
                            let rest = std::mem::take(&mut buffer);
                            pending.extend(parse_sse_line(&rest)?);
                            if pending.is_empty() {
                                return Ok(None);
                            }
                        }
                    }
                }
            },
        );

        Ok(Box::pin(s))
    }
}

type SseState = (
    BoxStream<'static, reqwest::Result<Bytes>>,
    Vec<u8>,
    VecDeque<ResponseChunk>,
);

/// Parse one SSE line. Anything other than a `data:` line yields no chunks.
fn parse_sse_line(line: &[u8]) -> Result<Vec<ResponseChunk>> {
    let line = String::from_utf8_lossy(line);
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(Vec::new());
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(Vec::new());
    }
    let response: StreamResponse = serde_json::from_str(data)?;
    chunks_from_response(response)
}

fn chunks_from_response(response: StreamResponse) -> Result<Vec<ResponseChunk>> {
    if let Some(err) = response.error {
        return Err(Error::Agent(format!("gemini api error: {}", err.describe())));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Ok(vec![ResponseChunk::Finish(FinishReason::from_api(&reason))]);
        }
        return Ok(vec![ResponseChunk::Empty]);
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    let mut chunks = Vec::new();
    if !text.is_empty() {
        chunks.push(ResponseChunk::Text(text));
    }
    if let Some(reason) = candidate.finish_reason {
        chunks.push(ResponseChunk::Finish(FinishReason::from_api(&reason)));
    }
    if chunks.is_empty() {
        chunks.push(ResponseChunk::Empty);
    }
    Ok(chunks)
}

fn describe_http_error(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| wrapper.error.describe())
        .unwrap_or_else(|_| body.trim().to_string());
    format!("gemini api error ({}): {detail}", status.as_u16())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestBody<'a> {
    contents: Vec<ApiContent<'a>>,
    safety_settings: &'a [SafetySetting],
}

#[derive(Serialize)]
struct ApiContent<'a> {
    role: Role,
    parts: Vec<ApiPart<'a>>,
}

impl<'a> From<&'a Content> for ApiContent<'a> {
    fn from(content: &'a Content) -> Self {
        Self {
            role: content.role,
            parts: content.parts.iter().map(ApiPart::from).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum ApiPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl<'a> From<&'a InputPart> for ApiPart<'a> {
    fn from(part: &'a InputPart) -> Self {
        match part {
            InputPart::Text(text) => ApiPart::Text { text },
            InputPart::Image { subtype, data } => ApiPart::InlineData {
                inline_data: InlineData {
                    mime_type: format!("image/{subtype}"),
                    data: BASE64.encode(data),
                },
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

impl ApiError {
    fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match self.status.as_deref() {
            Some(status) if !status.is_empty() => format!("{status}: {message}"),
            _ => message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<Vec<ResponseChunk>> {
        chunks_from_response(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn request_body_carries_history_images_and_safety() {
        let provider = GeminiProvider::new("key".into());
        let request = GenerateRequest {
            model: "gemini-2.0-flash".into(),
            contents: vec![
                Content::user(vec![InputPart::text("hi")]),
                Content::model_text("hello"),
                Content::user(vec![
                    InputPart::Image {
                        subtype: "png".into(),
                        data: Bytes::from_static(b"abc"),
                    },
                    InputPart::text("what is this?"),
                ]),
            ],
        };

        let body = provider.build_request_body(&request).unwrap();

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["contents"][1]["role"], "model");
        let image = &body["contents"][2]["parts"][0]["inlineData"];
        assert_eq!(image["mimeType"], "image/png");
        assert_eq!(image["data"], "YWJj");
        assert_eq!(body["contents"][2]["parts"][1]["text"], "what is this?");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(body["safetySettings"][3]["category"], "HARM_CATEGORY_DANGEROUS_CONTENT");
        assert_eq!(body["safetySettings"][3]["threshold"], "BLOCK_NONE");
    }

    #[test]
    fn stream_url_targets_sse_endpoint() {
        let provider =
            GeminiProvider::new("key".into()).with_base_url("http://localhost:1/v1beta/".into());
        assert_eq!(
            provider.stream_url("gemini-pro"),
            "http://localhost:1/v1beta/models/gemini-pro:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn text_parts_are_joined() {
        let chunks = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello, "}, {"text": "world"}]}
            }]
        }))
        .unwrap();
        assert_eq!(chunks, vec![ResponseChunk::Text("Hello, world".into())]);
    }

    #[test]
    fn text_with_finish_reason_yields_both() {
        let chunks = parse(json!({
            "candidates": [{
                "content": {"parts": [{"text": "done"}]},
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(
            chunks,
            vec![
                ResponseChunk::Text("done".into()),
                ResponseChunk::Finish(FinishReason::Stop)
            ]
        );
    }

    #[test]
    fn finish_only_candidate() {
        let chunks = parse(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert_eq!(chunks, vec![ResponseChunk::Finish(FinishReason::Safety)]);
    }

    #[test]
    fn no_candidates_is_empty() {
        assert_eq!(parse(json!({})).unwrap(), vec![ResponseChunk::Empty]);
    }

    #[test]
    fn blocked_prompt_reports_block_reason() {
        let chunks = parse(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert_eq!(chunks, vec![ResponseChunk::Finish(FinishReason::Safety)]);
    }

    #[test]
    fn inline_error_is_terminal() {
        let err = parse(json!({"error": {"code": 500, "message": "boom", "status": "INTERNAL"}}))
            .unwrap_err();
        assert!(err.to_string().contains("INTERNAL: boom"));
    }

    #[test]
    fn non_data_lines_are_skipped() {
        assert!(parse_sse_line(b": keep-alive\n").unwrap().is_empty());
        assert!(parse_sse_line(b"\r\n").unwrap().is_empty());
        assert!(parse_sse_line(b"event: message\n").unwrap().is_empty());
    }

    #[test]
    fn data_line_with_crlf_parses() {
        let line = b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"x\"}]}}]}\r\n";
        assert_eq!(
            parse_sse_line(line).unwrap(),
            vec![ResponseChunk::Text("x".into())]
        );
    }

    #[test]
    fn http_error_body_is_summarised() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            describe_http_error(StatusCode::BAD_REQUEST, body),
            "gemini api error (400): INVALID_ARGUMENT: API key not valid"
        );
        assert_eq!(
            describe_http_error(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "gemini api error (502): upstream down"
        );
    }
}
