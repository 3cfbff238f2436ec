//! Anthropic Messages API client.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Extended reasoning via the `thinking` request field
//! - Streaming transport (SSE) for reasoning calls, so long generations
//!   are not bounded by a fixed response timeout
//! - Typed response blocks: `text` concatenates into the output,
//!   `thinking` into the reasoning trace

use async_trait::async_trait;
use futures::StreamExt;
use perceptor_core::error::LlmError;
use perceptor_core::llm::{Completion, CompletionRequest, LlmClient};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::meter::UsageMeter;
use crate::pricing::PricingTable;
use crate::retry::{with_retry, RetryPolicy};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Connect-phase deadline for every request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total deadline for non-streaming calls only. Streaming responses carry
/// no response deadline; a reasoning generation may run well past this.
const DIRECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output-cap headroom above the reasoning budget, so the final answer is
/// never squeezed out by a long reasoning trace.
const REASONING_HEADROOM_TOKENS: u32 = 16_000;

/// Anthropic Messages API client.
pub struct AnthropicClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    pricing: PricingTable,
    meter: Arc<UsageMeter>,
}

impl AnthropicClient {
    /// Create a new client recording usage into the caller's meter.
    pub fn new(api_key: impl Into<String>, meter: Arc<UsageMeter>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
            retry: RetryPolicy::default(),
            pricing: PricingTable::with_defaults(),
            meter,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        if request.reasoning.is_some() {
            self.send_streaming(request).await
        } else {
            self.send_direct(request).await
        }
    }

    /// Assemble a `/v1/messages` request. Only the non-streaming form gets
    /// the total deadline; an SSE response must be free to run long.
    fn messages_request(&self, body: &serde_json::Value, stream: bool) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body);
        if stream {
            builder.header("Accept", "text/event-stream")
        } else {
            builder.timeout(DIRECT_TIMEOUT)
        }
    }

    async fn send_direct(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = build_body(request, false);

        debug!(model = %request.model, "Sending completion request");

        let response = self
            .messages_request(&body, false)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = ensure_ok(response).await?;

        let api_resp: MessagesResponse = response.json().await.map_err(|e| LlmError::Api {
            status_code: 200,
            message: format!("Failed to parse Anthropic response: {e}"),
        })?;

        let mut text = String::new();
        let mut reasoning = String::new();
        for block in api_resp.content {
            match block {
                ResponseBlock::Text { text: piece } => append_block(&mut text, &piece),
                ResponseBlock::Thinking { thinking } => append_block(&mut reasoning, &thinking),
                ResponseBlock::Other => {}
            }
        }

        Ok(self.assemble_completion(
            api_resp.model,
            text,
            reasoning,
            api_resp.usage.input_tokens,
            api_resp.usage.output_tokens,
        ))
    }

    async fn send_streaming(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = build_body(request, true);

        debug!(model = %request.model, "Sending streaming completion request");

        let response = self
            .messages_request(&body, true)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let response = ensure_ok(response).await?;

        let mut byte_stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut acc = StreamAccumulator::default();

        while let Some(chunk) = byte_stream.next().await {
            let bytes = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            lines.extend(&bytes);

            while let Some(line) = lines.next_line() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                if let Some(event_type) = line.strip_prefix("event: ") {
                    if event_type.trim() == "message_stop" {
                        acc.done = true;
                    }
                    continue;
                }
                if let Some(data) = line.strip_prefix("data: ") {
                    let data = data.trim();
                    if !data.is_empty() {
                        acc.apply(data)?;
                    }
                }
            }

            if acc.done {
                break;
            }
        }

        if !acc.done {
            return Err(LlmError::StreamInterrupted(
                "stream ended before message_stop".into(),
            ));
        }

        let model = acc.model.unwrap_or_else(|| request.model.clone());
        Ok(self.assemble_completion(model, acc.text, acc.reasoning, acc.input_tokens, acc.output_tokens))
    }

    fn assemble_completion(
        &self,
        model: String,
        text: String,
        reasoning: String,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Completion {
        let reasoning_tokens = estimate_reasoning_tokens(output_tokens, &reasoning, &text);
        let cost_usd = self.pricing.compute_cost(&model, input_tokens, output_tokens);
        Completion {
            text,
            reasoning,
            input_tokens,
            output_tokens,
            reasoning_tokens,
            model,
            cost_usd,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let request = adjust_for_reasoning(request);
        let completion = with_retry(&self.retry, || self.send(&request)).await?;
        self.meter.record(&completion);
        Ok(completion)
    }
}

/// Provider constraints when reasoning is on: the output cap must clear
/// the reasoning budget, and temperature must be exactly 1.0.
fn adjust_for_reasoning(mut request: CompletionRequest) -> CompletionRequest {
    if let Some(reasoning) = &request.reasoning {
        if request.max_tokens <= reasoning.budget_tokens {
            request.max_tokens = reasoning.budget_tokens + REASONING_HEADROOM_TOKENS;
        }
        request.temperature = 1.0;
    }
    request
}

fn build_body(request: &CompletionRequest, stream: bool) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model,
        "messages": request.messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    if let Some(ref system) = request.system {
        body["system"] = serde_json::json!(system);
    }
    if let Some(ref reasoning) = request.reasoning {
        body["thinking"] = serde_json::json!({
            "type": "enabled",
            "budget_tokens": reasoning.budget_tokens,
        });
    }
    if stream {
        body["stream"] = serde_json::json!(true);
    }
    body
}

async fn ensure_ok(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status().as_u16();
    if status == 429 {
        return Err(LlmError::RateLimited { retry_after_secs: 5 });
    }
    if status == 401 || status == 403 {
        return Err(LlmError::Auth("Invalid Anthropic API key".into()));
    }
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Anthropic API error");
        return Err(LlmError::Api {
            status_code: status,
            message: body,
        });
    }
    Ok(response)
}

fn append_block(buffer: &mut String, piece: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(piece);
}

/// The provider has no separate reasoning-token figure; apportion the
/// output count by character share. Observability only, never billing.
fn estimate_reasoning_tokens(output_tokens: u32, reasoning: &str, text: &str) -> u32 {
    if reasoning.is_empty() {
        return 0;
    }
    let reasoning_chars = reasoning.chars().count() as f64;
    let total_chars = reasoning_chars + text.chars().count() as f64;
    if total_chars == 0.0 {
        return 0;
    }
    (f64::from(output_tokens) * reasoning_chars / total_chars).round() as u32
}

/// Splits a raw SSE byte stream into lines. Bytes are buffered until a
/// newline arrives, so a UTF-8 sequence cut at a chunk boundary is
/// reassembled before decoding.
#[derive(Default)]
struct SseLineBuffer {
    bytes: Vec<u8>,
}

impl SseLineBuffer {
    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.bytes.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.bytes.drain(..=end).collect();
        let text = String::from_utf8_lossy(&line);
        Some(text.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// State accumulated while draining one SSE response.
#[derive(Default)]
struct StreamAccumulator {
    model: Option<String>,
    text: String,
    reasoning: String,
    input_tokens: u32,
    output_tokens: u32,
    done: bool,
}

impl StreamAccumulator {
    /// Fold one SSE data payload in. An in-stream `error` event maps to a
    /// rate-limit or stream-interruption failure.
    fn apply(&mut self, data: &str) -> Result<(), LlmError> {
        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE payload");
                return Ok(());
            }
        };

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                if let Some(model) = event["message"]["model"].as_str() {
                    self.model = Some(model.to_string());
                }
                if let Some(input) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = input as u32;
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            self.text.push_str(text);
                        }
                    }
                    "thinking_delta" => {
                        if let Some(thinking) = delta["thinking"].as_str() {
                            self.reasoning.push_str(thinking);
                        }
                    }
                    _ => {}
                }
            }
            "message_delta" => {
                if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = output as u32;
                }
            }
            "message_stop" => self.done = true,
            "error" => {
                let kind = event["error"]["type"].as_str().unwrap_or("");
                let message = event["error"]["message"].as_str().unwrap_or(data).to_string();
                return Err(match kind {
                    "rate_limit_error" | "overloaded_error" => {
                        LlmError::RateLimited { retry_after_secs: 5 }
                    }
                    _ => LlmError::StreamInterrupted(message),
                });
            }
            _ => {}
        }
        Ok(())
    }
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ResponseBlock>,
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use perceptor_core::llm::{ChatMessage, ReasoningConfig};

    fn request(max_tokens: u32, reasoning: Option<u32>) -> CompletionRequest {
        CompletionRequest {
            model: "claude-sonnet-4-20250514".into(),
            messages: vec![ChatMessage::user("hello")],
            system: Some("Describe the user.".into()),
            max_tokens,
            temperature: 0.7,
            reasoning: reasoning.map(|budget_tokens| ReasoningConfig { budget_tokens }),
        }
    }

    fn client() -> AnthropicClient {
        AnthropicClient::new("test-key", Arc::new(UsageMeter::new()))
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = client().with_base_url("https://proxy.example.com/");
        assert_eq!(client.base_url, "https://proxy.example.com");
    }

    #[test]
    fn only_direct_requests_carry_the_total_deadline() {
        let client = client();
        let body = build_body(&request(8_192, None), false);

        let direct = client.messages_request(&body, false).build().unwrap();
        assert_eq!(direct.timeout(), Some(&DIRECT_TIMEOUT));

        let streaming = client.messages_request(&body, true).build().unwrap();
        assert_eq!(streaming.timeout(), None);
    }

    #[test]
    fn reasoning_raises_the_output_cap_and_pins_temperature() {
        let adjusted = adjust_for_reasoning(request(8_192, Some(16_000)));
        assert_eq!(adjusted.max_tokens, 32_000);
        assert_eq!(adjusted.temperature, 1.0);
    }

    #[test]
    fn ample_output_cap_is_left_alone() {
        let adjusted = adjust_for_reasoning(request(50_000, Some(16_000)));
        assert_eq!(adjusted.max_tokens, 50_000);
        assert_eq!(adjusted.temperature, 1.0);
    }

    #[test]
    fn no_reasoning_means_no_adjustment() {
        let adjusted = adjust_for_reasoning(request(8_192, None));
        assert_eq!(adjusted.max_tokens, 8_192);
        assert!((adjusted.temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn body_carries_system_and_thinking_fields() {
        let body = build_body(&request(8_192, Some(4_096)), true);
        assert_eq!(body["system"], "Describe the user.");
        assert_eq!(body["thinking"]["type"], "enabled");
        assert_eq!(body["thinking"]["budget_tokens"], 4_096);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn body_omits_optional_fields_when_unset() {
        let mut req = request(8_192, None);
        req.system = None;
        let body = build_body(&req, false);
        assert!(body.get("system").is_none());
        assert!(body.get("thinking").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn response_blocks_split_into_text_and_reasoning() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "thinking", "thinking": "The commits suggest..."},
                    {"type": "text", "text": "{\"identity_anchor\": \"...\"}"}
                ],
                "usage": {"input_tokens": 1200, "output_tokens": 400}
            }"#,
        )
        .unwrap();

        let mut text = String::new();
        let mut reasoning = String::new();
        for block in resp.content {
            match block {
                ResponseBlock::Text { text: piece } => append_block(&mut text, &piece),
                ResponseBlock::Thinking { thinking } => append_block(&mut reasoning, &thinking),
                ResponseBlock::Other => {}
            }
        }
        assert!(text.starts_with("{\"identity_anchor\""));
        assert_eq!(reasoning, "The commits suggest...");
    }

    #[test]
    fn unknown_block_types_are_skipped() {
        let resp: MessagesResponse = serde_json::from_str(
            r#"{
                "model": "claude-sonnet-4-20250514",
                "content": [
                    {"type": "redacted_thinking", "data": "opaque"},
                    {"type": "text", "text": "answer"}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 5}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.content.len(), 2);
        assert!(matches!(resp.content[0], ResponseBlock::Other));
    }

    #[test]
    fn reasoning_tokens_follow_the_character_ratio() {
        let reasoning = "r".repeat(300);
        let text = "t".repeat(100);
        assert_eq!(estimate_reasoning_tokens(100, &reasoning, &text), 75);
        assert_eq!(estimate_reasoning_tokens(100, "", &text), 0);
        assert_eq!(estimate_reasoning_tokens(0, &reasoning, &text), 0);
    }

    #[test]
    fn stream_accumulator_replays_a_reasoning_session() {
        let mut acc = StreamAccumulator::default();
        let events = [
            r#"{"type":"message_start","message":{"model":"claude-sonnet-4-20250514","usage":{"input_tokens":900,"output_tokens":1}}}"#,
            r#"{"type":"content_block_delta","delta":{"type":"thinking_delta","thinking":"Weighing the "}}"#,
            r#"{"type":"content_block_delta","delta":{"type":"thinking_delta","thinking":"evidence."}}"#,
            r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"{\"identity"}}"#,
            r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"_anchor\":\"x\"}"}}"#,
            r#"{"type":"message_delta","usage":{"output_tokens":250}}"#,
            r#"{"type":"message_stop"}"#,
        ];
        for event in events {
            acc.apply(event).unwrap();
        }

        assert!(acc.done);
        assert_eq!(acc.model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(acc.reasoning, "Weighing the evidence.");
        assert_eq!(acc.text, "{\"identity_anchor\":\"x\"}");
        assert_eq!(acc.input_tokens, 900);
        assert_eq!(acc.output_tokens, 250);
    }

    #[test]
    fn stream_error_events_map_to_typed_failures() {
        let mut acc = StreamAccumulator::default();
        let overloaded =
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert!(matches!(
            acc.apply(overloaded).unwrap_err(),
            LlmError::RateLimited { .. }
        ));

        let invalid =
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad request"}}"#;
        assert!(matches!(
            acc.apply(invalid).unwrap_err(),
            LlmError::StreamInterrupted(_)
        ));
    }

    #[test]
    fn garbage_sse_payloads_are_ignored() {
        let mut acc = StreamAccumulator::default();
        acc.apply("not json at all").unwrap();
        acc.apply(r#"{"type":"ping"}"#).unwrap();
        assert!(acc.text.is_empty());
        assert!(!acc.done);
    }

    #[test]
    fn sse_line_buffer_yields_lines_in_order() {
        let mut lines = SseLineBuffer::default();
        lines.extend(b"event: message_stop\r\ndata: {}\n\n");
        assert_eq!(lines.next_line().as_deref(), Some("event: message_stop"));
        assert_eq!(lines.next_line().as_deref(), Some("data: {}"));
        assert_eq!(lines.next_line().as_deref(), Some(""));
        assert!(lines.next_line().is_none());
    }

    #[test]
    fn multibyte_characters_split_across_chunks_stay_intact() {
        let payload = "data: {\"text\":\"résumé\"}\n".as_bytes();
        let (head, tail) = payload.split_at(17); // cuts the first é between its two bytes

        let mut lines = SseLineBuffer::default();
        lines.extend(head);
        assert!(lines.next_line().is_none());
        lines.extend(tail);
        assert_eq!(
            lines.next_line().as_deref(),
            Some("data: {\"text\":\"résumé\"}")
        );
    }
}
