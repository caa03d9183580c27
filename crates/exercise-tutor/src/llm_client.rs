//! Chat backend client.
//!
//! Talks to an OpenAI-compatible `/v1/chat/completions` endpoint with
//! `stream: true` and turns the SSE body into a lazy sequence of content
//! fragments. The sequence is single-use: it wraps one HTTP response.
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{TutorError, TutorResult};
use crate::message::Message;

/// Ordered, finite, non-restartable pieces of one answer.
pub type FragmentStream = Pin<Box<dyn Stream<Item = TutorResult<String>> + Send>>;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start one generation over `messages` and return its fragments.
    async fn stream_chat(&self, messages: Vec<Message>) -> TutorResult<FragmentStream>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<ChatDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

pub struct OpenAiChatClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    http_client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url = base_url.into();
        info!("Chat client initialized with backend: {}", base_url);
        Self {
            base_url,
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.1,
            http_client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn stream_chat(&self, messages: Vec<Message>) -> TutorResult<FragmentStream> {
        debug!("Starting streamed chat completion with {} messages", messages.len());
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
            stream: true,
        };

        let response = self
            .http_client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TutorError::gateway(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TutorError::gateway(format!("backend returned {}: {}", status, body)));
        }

        Ok(Box::pin(sse_fragments(response.bytes_stream())))
    }
}

/// What one SSE line means for the fragment sequence.
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Fragment(String),
    Skip,
    Done,
}

fn parse_sse_line(line: &str) -> TutorResult<SseEvent> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| TutorError::gateway(format!("malformed stream chunk: {}", e)))?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseEvent::Skip);
    };

    match choice.delta.and_then(|d| d.content).filter(|c| !c.is_empty()) {
        Some(content) => Ok(SseEvent::Fragment(content)),
        None if choice.finish_reason.is_some() => Ok(SseEvent::Done),
        None => Ok(SseEvent::Skip),
    }
}

/// Split a byte stream on newlines and yield the content of each `data:` line.
fn sse_fragments<S, B, E>(byte_stream: S) -> impl Stream<Item = TutorResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures_util::pin_mut!(byte_stream);
        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result
                .map_err(|e| TutorError::gateway(format!("stream read error: {}", e)))?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);
                match parse_sse_line(line.trim())? {
                    SseEvent::Fragment(content) => yield content,
                    SseEvent::Skip => {}
                    SseEvent::Done => return,
                }
            }
        }

        let tail = String::from_utf8_lossy(&buffer).trim().to_string();
        if let SseEvent::Fragment(content) = parse_sse_line(&tail)? {
            yield content;
        }
    }
}


/// Backend double that replays fixed fragments and remembers what it was sent.
#[cfg(test)]
pub(crate) struct ScriptedBackend {
    fragments: Vec<String>,
    fail: bool,
    /// Pause before every fragment after the first.
    delay: Option<Duration>,
    pub received: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl ScriptedBackend {
    pub(crate) fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            fail: false,
            delay: None,
            received: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_chat(&self, messages: Vec<Message>) -> TutorResult<FragmentStream> {
        self.received.lock().unwrap().push(messages);
        if self.fail {
            return Err(TutorError::gateway("backend unreachable"));
        }
        let fragments = self.fragments.clone();
        let delay = self.delay;
        Ok(Box::pin(async_stream::stream! {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if let (Some(delay), true) = (delay, i > 0) {
                    tokio::time::sleep(delay).await;
                }
                yield Ok::<String, TutorError>(fragment);
            }
        }))
    }
}
