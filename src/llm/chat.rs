//! Streaming and non-streaming chat completion against an OpenAI-compatible
//! endpoint (DeepSeek in production).

use anyhow::{Context, Result};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::ChatMessage;

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A finished (non-streaming) completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub tokens_used: u32,
}

pub struct LlmClient {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Stream content deltas, one string per chunk.
    pub async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<TokenStream> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let req = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: true,
        };

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(300))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.as_deref().unwrap_or("")),
            )
            .json(&req)
            .send()
            .await
            .context("Failed to connect to chat completion API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Chat API returned {status}: {body}");
        }

        let stream = line_stream(resp.bytes_stream()).filter_map(|line_result| async move {
            match line_result {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }

    /// Single-shot completion for the non-streaming endpoint.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<Completion> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let req = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(120))
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.as_deref().unwrap_or("")),
            )
            .json(&req)
            .send()
            .await
            .context("Failed to connect to chat completion API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Chat API returned {status}: {body}");
        }

        let body: ChatCompletionResponse = resp
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        Ok(Completion {
            content: body
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .unwrap_or_default(),
            tokens_used: body.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Parse a single SSE line from the completion stream. Returns:
/// - Some(Ok(content)) for content deltas
/// - Some(Err(e)) for parse errors
/// - None to skip (empty lines, [DONE], role-only chunks)
fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data = line.strip_prefix("data: ")?.trim();

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .first()
                .and_then(|c| c.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => Some(Err(anyhow::anyhow!("Failed to parse stream chunk: {e}"))),
    }
}

/// Accumulates raw body bytes and hands back complete lines. Bytes are
/// only decoded at newline boundaries, so multi-byte characters split
/// across network chunks survive intact.
#[derive(Default)]
struct LineBuffer {
    partial: Vec<u8>,
    ready: std::collections::VecDeque<String>,
}

impl LineBuffer {
    fn feed(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if byte == b'\n' {
                self.take_partial();
            } else {
                self.partial.push(byte);
            }
        }
    }

    /// Flush whatever is left after the body ends (a final unterminated line).
    fn finish(&mut self) {
        self.take_partial();
    }

    fn next_line(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn take_partial(&mut self) {
        let line = String::from_utf8_lossy(&self.partial).trim().to_string();
        self.partial.clear();
        if !line.is_empty() {
            self.ready.push_back(line);
        }
    }
}

/// Turn the response body into a stream of non-empty lines.
fn line_stream(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send {
    let state = (Box::pin(byte_stream), LineBuffer::default(), false);
    futures_util::stream::unfold(state, |(mut body, mut buffer, mut exhausted)| async move {
        loop {
            if let Some(line) = buffer.next_line() {
                return Some((Ok(line), (body, buffer, exhausted)));
            }
            if exhausted {
                return None;
            }
            match body.next().await {
                Some(Ok(bytes)) => buffer.feed(&bytes),
                Some(Err(e)) => {
                    return Some((
                        Err(anyhow::anyhow!("chat response body failed mid-read: {e}")),
                        (body, buffer, exhausted),
                    ));
                }
                None => {
                    buffer.finish();
                    exhausted = true;
                }
            }
        }
    })
}
