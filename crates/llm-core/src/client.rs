//! Chat-completion client
//!
//! `ChatClient` is the boundary the agent loop talks to. `OpenAiClient`
//! implements it against any OpenAI-compatible `/chat/completions` endpoint.
//! Transient failures are retried. `try_complete` reports what still fails;
//! `complete` and `stream` turn it into assistant text so a step always
//! finishes.

use std::pin::Pin;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::chat::{ChatMessage, ToolDefinition};
use crate::config::Config;

/// Finite, single-pass stream of text fragments.
///
/// Ends when the server sends `data: [DONE]` or closes the body.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Failure kinds of a single request attempt
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Received an invalid response from the server: {0}")]
    Malformed(String),
    #[error("Received an empty or malformed response from the server.")]
    EmptyResponse,
}

impl ChatError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ChatError::Network(_) => true,
            ChatError::Status { status, .. } => *status == 429 || *status >= 500 || *status == 408,
            ChatError::Malformed(_) | ChatError::EmptyResponse => false,
        }
    }

    /// Text shown in place of an assistant reply
    pub fn user_message(&self) -> String {
        if self.is_transient() {
            format!("API Connection Error: {}", self)
        } else {
            format!("API Error: {}", self)
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Network(e.to_string())
    }
}

/// Retry policy for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// The LLM operations the agent depends on
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Request one assistant turn, retrying transient failures
    async fn try_complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatMessage, ChatError>;

    /// Request one assistant turn. Never fails: errors come back as
    /// assistant content.
    async fn complete(&self, messages: &[ChatMessage], tools: Option<&[ToolDefinition]>) -> ChatMessage {
        match self.try_complete(messages, tools).await {
            Ok(message) => message,
            Err(e) => ChatMessage::assistant(e.user_message()),
        }
    }

    /// Stream a plain conversational answer, fragment by fragment.
    fn stream(&self, messages: &[ChatMessage]) -> TextStream;

    /// Model identifier, for display
    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatMessage], tools: Option<&'a [ToolDefinition]>) -> Self {
        let tools = tools.filter(|t| !t.is_empty());
        Self {
            model,
            messages,
            tool_choice: tools.map(|_| "auto"),
            tools,
            stream: None,
        }
    }

    fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<Value>,
}

/// Parse a non-streaming response body into the assistant turn
pub fn parse_completion(body: &str) -> Result<ChatMessage, ChatError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ChatError::Malformed(e.to_string()))?;

    let mut message = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .ok_or(ChatError::EmptyResponse)?;

    // Some servers omit the role on the returned message
    if let Some(obj) = message.as_object_mut() {
        obj.entry("role").or_insert_with(|| Value::String("assistant".to_string()));
    }

    serde_json::from_value(message).map_err(|e| ChatError::Malformed(e.to_string()))
}

/// One decoded line of a server-sent event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Incremental `delta.content`
    Fragment(String),
    /// The `[DONE]` sentinel
    Done,
    /// Blank lines, comments, keep-alives, chunks without content
    Skip,
}

/// Decode one `data: {...}` line of a streaming response
pub fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    let Ok(chunk) = serde_json::from_str::<Value>(data) else {
        return SseLine::Skip;
    };

    match chunk
        .pointer("/choices/0/delta/content")
        .and_then(|v| v.as_str())
    {
        Some(text) if !text.is_empty() => SseLine::Fragment(text.to_string()),
        _ => SseLine::Skip,
    }
}

/// Client for OpenAI-compatible chat-completion endpoints
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: Config,
    retry: RetryConfig,
}

impl OpenAiClient {
    /// Create a client with the default retry policy
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            config,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A single non-streaming attempt
    async fn complete_once(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatMessage, ChatError> {
        let request = ChatRequest::new(&self.config.model, messages, tools);
        let body = serde_json::to_value(&request).map_err(|e| ChatError::Malformed(e.to_string()))?;

        let response = post_json(&self.http, &self.config, &body).await?;
        let text = response.text().await?;
        parse_completion(&text)
    }
}

async fn post_json(
    http: &reqwest::Client,
    config: &Config,
    body: &Value,
) -> Result<reqwest::Response, ChatError> {
    let mut req = http.post(config.completions_url()).json(body);
    if let Some(ref key) = config.api_key {
        req = req.bearer_auth(key);
    }

    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl ChatClient for OpenAiClient {
    #[instrument(skip_all, fields(messages = messages.len()))]
    async fn try_complete(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ChatMessage, ChatError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            match self.complete_once(messages, tools).await {
                Ok(message) => {
                    debug!(attempt, model = %self.config.model, tool_calls = message.tool_calls().len(), "Received completion");
                    return Ok(message);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, error = %e, "Chat request failed, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Chat request failed");
                    return Err(e);
                }
            }
        }
    }

    fn stream(&self, messages: &[ChatMessage]) -> TextStream {
        let body = serde_json::to_value(ChatRequest::new(&self.config.model, messages, None).streaming());
        let http = self.http.clone();
        let config = self.config.clone();
        let retry = self.retry;

        Box::pin(async_stream::stream! {
            let body = match body {
                Ok(b) => b,
                Err(e) => {
                    yield ChatError::Malformed(e.to_string()).user_message();
                    return;
                }
            };

            let attempts = retry.attempts();
            let mut last_error = None;

            for attempt in 1..=attempts {
                let response = match post_json(&http, &config, &body).await {
                    Ok(r) => r,
                    Err(e) if !e.is_transient() => {
                        warn!(attempt, error = %e, "Streaming request rejected");
                        yield e.user_message();
                        return;
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, "Streaming request failed");
                        last_error = Some(e);
                        if attempt < attempts {
                            tokio::time::sleep(retry.delay).await;
                        }
                        continue;
                    }
                };

                let mut bytes = response.bytes_stream();
                let mut buffer: Vec<u8> = Vec::new();

                while let Some(chunk) = bytes.next().await {
                    match chunk {
                        Ok(chunk) => buffer.extend_from_slice(&chunk),
                        Err(e) => {
                            warn!(error = %e, "Stream interrupted");
                            yield format!("\n[stream interrupted: {}]", e);
                            return;
                        }
                    }

                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        match parse_sse_line(&String::from_utf8_lossy(&line)) {
                            SseLine::Fragment(text) => yield text,
                            SseLine::Done => return,
                            SseLine::Skip => {}
                        }
                    }
                }

                if let SseLine::Fragment(text) = parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    yield text;
                }
                return;
            }

            if let Some(e) = last_error {
                yield e.user_message();
            }
        })
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Collect a text stream into one string
pub async fn collect_text(mut stream: TextStream) -> String {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const SSE_HEADERS: &str =
        "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

    fn json_response(status: &str, body: &str) -> Vec<String> {
        vec![format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )]
    }

    /// Serve one canned response per connection, written chunk by chunk.
    /// Returns the base URL and a counter of requests received.
    async fn serve(responses: Vec<Vec<String>>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local test server");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for chunks in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);

                for chunk in chunks {
                    if socket.write_all(chunk.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = socket.flush().await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/v1", addr), hits)
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            data.extend_from_slice(&buf[..n]);

            let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&data[..end]).to_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
    }

    fn local_client(host: &str, max_attempts: u32) -> OpenAiClient {
        let config = Config::default().with_host(host).with_timeout(5);
        OpenAiClient::new(config).unwrap().with_retry(RetryConfig {
            max_attempts,
            delay: Duration::ZERO,
        })
    }

    fn unreachable_client() -> OpenAiClient {
        // Port 9 (discard) is closed on any normal machine
        let config = Config::default().with_host("http://127.0.0.1:9/v1").with_timeout(2);
        OpenAiClient::new(config).unwrap().with_retry(RetryConfig {
            max_attempts: 2,
            delay: Duration::ZERO,
        })
    }

    #[test]
    fn test_request_with_tools_sets_tool_choice() {
        let tools = vec![ToolDefinition::new("explain_plan", "plan", json!({"type": "object"}))];
        let messages = vec![ChatMessage::user("hi")];
        let value = serde_json::to_value(ChatRequest::new("m", &messages, Some(tools.as_slice()))).unwrap();

        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["function"]["name"], "explain_plan");
        assert!(value.get("stream").is_none());
    }

    #[test]
    fn test_request_without_tools() {
        let messages = vec![ChatMessage::user("hi")];
        let value = serde_json::to_value(ChatRequest::new("m", &messages, Some(&[] as &[ToolDefinition])).streaming()).unwrap();

        assert!(value.get("tools").is_none());
        assert!(value.get("tool_choice").is_none());
        assert_eq!(value["stream"], true);
    }

    #[test]
    fn test_parse_completion_tool_call() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"c1","type":"function","function":{"name":"explain_plan","arguments":"{\"plan\":\"p\"}"}}]}}]}"#;
        let msg = parse_completion(body).unwrap();
        assert_eq!(msg.tool_calls()[0].id, "c1");
    }

    #[test]
    fn test_parse_completion_missing_role() {
        let msg = parse_completion(r#"{"choices":[{"message":{"content":"hello"}}]}"#).unwrap();
        assert_eq!(msg.role(), Role::Assistant);
        assert_eq!(msg.content(), Some("hello"));
    }

    #[test]
    fn test_parse_completion_errors() {
        assert!(matches!(parse_completion("<html>"), Err(ChatError::Malformed(_))));
        assert!(matches!(parse_completion(r#"{"choices":[]}"#), Err(ChatError::EmptyResponse)));
        assert!(matches!(parse_completion("{}"), Err(ChatError::EmptyResponse)));
    }

    #[test]
    fn test_parse_sse_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            SseLine::Fragment("Hel".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {broken"), SseLine::Skip);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChatError::Network("reset".into()).is_transient());
        assert!(ChatError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!ChatError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!ChatError::EmptyResponse.is_transient());
    }

    #[tokio::test]
    async fn test_complete_degrades_to_assistant_content() {
        let client = unreachable_client();
        let msg = client.complete(&[ChatMessage::user("hi")], None).await;

        assert_eq!(msg.role(), Role::Assistant);
        assert!(msg.content().unwrap().starts_with("API Connection Error"));
        assert!(msg.tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_stream_degrades_to_single_fragment() {
        let client = unreachable_client();
        let text = collect_text(client.stream(&[ChatMessage::user("hi")])).await;
        assert!(text.starts_with("API Connection Error"));
    }

    #[tokio::test]
    async fn test_transient_status_is_retried() {
        let ok = r#"{"choices":[{"message":{"role":"assistant","content":"recovered"}}]}"#;
        let (host, hits) = serve(vec![
            json_response("503 Service Unavailable", "overloaded"),
            json_response("200 OK", ok),
        ])
        .await;

        let msg = local_client(&host, 3)
            .try_complete(&[ChatMessage::user("hi")], None)
            .await
            .unwrap();

        assert_eq!(msg.content(), Some("recovered"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let (host, hits) = serve(vec![
            json_response("401 Unauthorized", r#"{"error":"bad key"}"#),
            json_response("200 OK", "{}"),
        ])
        .await;
        let client = local_client(&host, 3);

        let err = client
            .try_complete(&[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Status { status: 401, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(err.user_message().starts_with("API Error: HTTP 401"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_assistant_text() {
        let (host, hits) = serve(vec![
            json_response("503 Service Unavailable", "busy"),
            json_response("503 Service Unavailable", "busy"),
        ])
        .await;

        let msg = local_client(&host, 2)
            .complete(&[ChatMessage::user("hi")], None)
            .await;

        assert_eq!(msg.content(), Some("API Connection Error: HTTP 503: busy"));
        assert!(msg.tool_calls().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stream_joins_split_chunks_and_stops_at_done() {
        let (host, _) = serve(vec![vec![
            SSE_HEADERS.to_string(),
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel".to_string(),
            "lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n".to_string(),
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"after\"}}]}\n\n".to_string(),
        ]])
        .await;

        let text = collect_text(local_client(&host, 1).stream(&[ChatMessage::user("hi")])).await;
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_stream_does_not_retry_client_errors() {
        let (host, hits) = serve(vec![
            json_response("400 Bad Request", "no such model"),
            vec![SSE_HEADERS.to_string(), "data: [DONE]\n\n".to_string()],
        ])
        .await;

        let text = collect_text(local_client(&host, 3).stream(&[ChatMessage::user("hi")])).await;
        assert_eq!(text, "API Error: HTTP 400: no such model");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
