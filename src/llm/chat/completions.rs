use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{Client as HttpClient, header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION}};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::time::Duration;

use super::sse::{ SseDecoder, SseEvent };
use super::{ create_streaming_response, ChatClient, ChunkStream };
use crate::error::RelayError;
use crate::llm::LlmConfig;
use crate::models::chat::ChatMessage;

/// Client for the OpenAI-style `chat/completions` endpoint that Groq, OpenAI
/// and Ollama all expose.
pub struct CompletionsClient {
    http: HttpClient,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(rename = "max_tokens")]
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl CompletionsClient {
    pub fn new(
        api_key: Option<String>,
        model: String,
        endpoint: String,
        temperature: f32,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| format!("Invalid API key format: {}", e))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model,
            endpoint,
            temperature,
            max_tokens,
            timeout,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() && config.llm_type.requires_api_key() {
            return Err(format!("{} API key is required", config.llm_type).into());
        }

        Self::new(
            api_key,
            config.completion_model
                .clone()
                .unwrap_or_else(|| config.llm_type.default_model().to_string()),
            config.base_url
                .clone()
                .unwrap_or_else(|| config.llm_type.default_base_url().to_string()),
            config.temperature,
            config.max_tokens,
            config.timeout,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage], stream: bool) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: stream.then_some(true),
        }
    }
}

#[async_trait]
impl ChatClient for CompletionsClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError> {
        let resp = self.http.post(&self.endpoint)
            .timeout(self.timeout)
            .json(&self.request(messages, false))
            .send()
            .await?
            .error_for_status()?;

        let body = resp.bytes().await?;
        let parsed: CompletionResponse = serde_json::from_slice(&body)
            .map_err(|e| RelayError::UpstreamMalformed(e.to_string()))?;

        parsed.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RelayError::UpstreamMalformed("no choices in completion".to_string()))
    }

    async fn stream_completion(&self, messages: &[ChatMessage]) -> Result<ChunkStream, RelayError> {
        info!("Starting stream request to {}", self.endpoint);
        // The response head and each body read are bounded, the stream as a whole is not.
        let idle = self.timeout;
        let send = self.http.post(&self.endpoint)
            .json(&self.request(messages, true))
            .send();
        let resp = tokio::time::timeout(idle, send)
            .await
            .map_err(|_| {
                RelayError::UpstreamUnavailable(
                    format!("no response from upstream within {:?}", idle)
                )
            })??
            .error_for_status()?;

        Ok(create_streaming_response(move |tx| async move {
            let mut bytes = resp.bytes_stream();
            let mut decoder = SseDecoder::default();

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Stream consumer went away, dropping upstream response");
                        return;
                    }
                    next = tokio::time::timeout(idle, bytes.next()) => next,
                };

                let next = match next {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Upstream stream stalled for {:?}, giving up", idle);
                        let _ = tx.send(Err(RelayError::UpstreamUnavailable(
                            format!("upstream stream stalled for {:?}", idle)
                        ))).await;
                        return;
                    }
                };

                let finished = next.is_none();
                let events = match next {
                    Some(Ok(buf)) => decoder.feed(&buf),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(RelayError::from(e))).await;
                        return;
                    }
                    None => decoder.finish(),
                };

                for event in events {
                    match event {
                        SseEvent::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        SseEvent::Done => return,
                        SseEvent::Error(message) => {
                            let _ = tx.send(Err(RelayError::UpstreamMalformed(message))).await;
                            return;
                        }
                    }
                }

                if finished {
                    return;
                }
            }
        }))
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}
