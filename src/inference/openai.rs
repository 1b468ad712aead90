//! OpenAI-compatible HTTP providers (llama.cpp server, Ollama, vLLM, …).
//!
//! Embeddings use `POST {base}/v1/embeddings`; chat uses a streaming
//! `POST {base}/v1/chat/completions` and reads its server-sent `data:` lines.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use super::{ChatModel, ChatRequest, Embedder, InferenceError, StreamEnd};
use crate::config::{ChatConfig, EmbeddingConfig};
use crate::stream::TokenSink;

fn build_client(api_key: Option<&str>, timeout: Option<Duration>) -> anyhow::Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }
    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(InferenceError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Embedding client for an OpenAI-compatible server.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    url: String,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let http = build_client(
            config.api_key.as_deref(),
            Some(Duration::from_secs(config.timeout_secs)),
        )?;
        tracing::info!(base_url = %config.base_url, model = %config.model, "embedding provider configured");
        Ok(Self {
            http,
            url: format!("{}/v1/embeddings", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        let resp = self.http.post(&self.url).json(&body).send().await?;
        let resp = error_for_status(resp).await?;
        let value: serde_json::Value = resp.json().await?;
        parse_embedding_response(&value)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Extract `data[0].embedding` from an embeddings response.
pub fn parse_embedding_response(value: &serde_json::Value) -> Result<Vec<f32>, InferenceError> {
    let raw = value["data"][0]["embedding"]
        .as_array()
        .ok_or_else(|| InferenceError::InvalidResponse("missing data[0].embedding".into()))?;
    if raw.is_empty() {
        return Err(InferenceError::InvalidResponse("empty embedding".into()));
    }
    raw.iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| InferenceError::InvalidResponse(format!("non-numeric component: {v}")))
        })
        .collect()
}

/// Streaming chat client for an OpenAI-compatible server.
pub struct OpenAiChat {
    http: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig) -> anyhow::Result<Self> {
        // No overall timeout: a long answer is a long response body.
        let http = build_client(config.api_key.as_deref(), None)?;
        tracing::info!(base_url = %config.base_url, model = %config.model, "chat provider configured");
        Ok(Self {
            http,
            url: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        sink: &TokenSink,
    ) -> Result<StreamEnd, InferenceError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": self.temperature,
            "top_p": self.top_p,
            "stream": true,
        });

        let send = self.http.post(&self.url).json(&body).send();
        let resp = tokio::select! {
            _ = sink.closed() => return Ok(StreamEnd::Cancelled),
            resp = send => error_for_status(resp?).await?,
        };

        let mut bytes = std::pin::pin!(resp.bytes_stream());
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let next = tokio::select! {
                _ = sink.closed() => {
                    tracing::info!("chat consumer disconnected, abandoning generation");
                    return Ok(StreamEnd::Cancelled);
                }
                next = bytes.next() => next,
            };

            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_stream_line(&line)? {
                    StreamLine::Token { text, finished } => {
                        if !sink.send_token(text).await {
                            return Ok(StreamEnd::Cancelled);
                        }
                        if finished {
                            return Ok(StreamEnd::Completed);
                        }
                    }
                    StreamLine::Done => return Ok(StreamEnd::Completed),
                    StreamLine::Skip => {}
                }
            }
        }

        // Some servers close the body right after the final chunk without a
        // trailing newline.
        let tail = String::from_utf8_lossy(&buffer);
        match parse_stream_line(&tail)? {
            StreamLine::Done => Ok(StreamEnd::Completed),
            StreamLine::Token { text, finished } => {
                if !sink.send_token(text).await {
                    return Ok(StreamEnd::Cancelled);
                }
                if finished {
                    Ok(StreamEnd::Completed)
                } else {
                    Err(InferenceError::Truncated)
                }
            }
            StreamLine::Skip => Err(InferenceError::Truncated),
        }
    }
}

/// One parsed line of an OpenAI-style event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    /// Generated text. `finished` is set when the same chunk carries a
    /// `finish_reason`.
    Token { text: String, finished: bool },
    /// `[DONE]`, or a content-free chunk carrying a `finish_reason`.
    Done,
    Skip,
}

/// Parse a single SSE line from a streaming completion.
///
/// Tokens come from `choices[0].delta.content` (chat) or `choices[0].text`
/// (completion-style servers). Comments, blank lines, and non-data fields are
/// skipped. A chunk with a `finish_reason` ends the stream whether or not it
/// also carries content.
pub fn parse_stream_line(line: &str) -> Result<StreamLine, InferenceError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(StreamLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }

    let event: serde_json::Value = serde_json::from_str(data)?;
    if let Some(message) = event["error"]["message"].as_str() {
        return Err(InferenceError::InvalidResponse(message.to_string()));
    }

    let choice = &event["choices"][0];
    let token = choice["delta"]["content"]
        .as_str()
        .or_else(|| choice["text"].as_str())
        .unwrap_or("");

    let finished = choice["finish_reason"].is_string();

    if !token.is_empty() {
        Ok(StreamLine::Token {
            text: token.to_string(),
            finished,
        })
    } else if finished {
        Ok(StreamLine::Done)
    } else {
        Ok(StreamLine::Skip)
    }
}
