pub mod greeting;
pub mod relay;
pub mod validator;

use futures::StreamExt;
use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;

use self::greeting::{ GreetingMatcher, GreetingScope };
use self::relay::CompletionRelay;
use self::validator::parse_request;
use crate::cli::Args;
use crate::config::prompt::PromptConfig;
use crate::error::{ ChatError, RelayError };
use crate::llm::chat::{ full_response_as_stream, ChatClient, ChunkStream };
use crate::ratelimit::RateLimitStore;

/// What the endpoint sends back on success.
pub enum ChatOutcome {
    Reply(String),
    Stream(ChunkStream),
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatOutcome::Reply(text) => f.debug_tuple("Reply").field(text).finish(),
            ChatOutcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Runs one chat request through rate limiting, validation, the greeting
/// shortcut and the relay, in that order.
pub struct ChatService {
    limiter: Arc<dyn RateLimitStore>,
    greeting: GreetingMatcher,
    relay: CompletionRelay,
    stream_by_default: bool,
}

impl ChatService {
    pub fn new(
        limiter: Arc<dyn RateLimitStore>,
        greeting: GreetingMatcher,
        relay: CompletionRelay,
        stream_by_default: bool,
    ) -> Self {
        Self { limiter, greeting, relay, stream_by_default }
    }

    pub fn from_parts(
        args: &Args,
        prompts: &PromptConfig,
        limiter: Arc<dyn RateLimitStore>,
        client: Arc<dyn ChatClient>,
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let scope: GreetingScope = args.greeting_scope.parse()?;
        info!("Greeting shortcut scope: {}", scope);
        Ok(Self::new(
            limiter,
            GreetingMatcher::new(scope, prompts.greeting_reply.clone()),
            CompletionRelay::new(client, prompts.system_prompt.clone()),
            args.stream_responses,
        ))
    }

    pub async fn handle(
        &self,
        request_id: &str,
        identifier: &str,
        body: &[u8],
        stream_override: Option<bool>,
    ) -> Result<ChatOutcome, ChatError> {
        if !self.admit(request_id, identifier).await {
            warn!("[{}] Rate limit exceeded for '{}'", request_id, identifier);
            return Err(ChatError::RateLimited);
        }

        let request = parse_request(body).map_err(|e| {
            info!("[{}] Rejected payload: {}", request_id, e);
            e
        })?;
        let stream = stream_override.or(request.stream).unwrap_or(self.stream_by_default);

        if let Some(reply) = self.greeting.matches(&request.conversation) {
            info!("[{}] Answered greeting without upstream call", request_id);
            return Ok(if stream {
                ChatOutcome::Stream(full_response_as_stream(reply.to_string()))
            } else {
                ChatOutcome::Reply(reply.to_string())
            });
        }

        info!(
            "[{}] Relaying {} messages (stream={})",
            request_id,
            request.conversation.len(),
            stream
        );

        if !stream {
            let reply = self.relay.complete(&request.conversation).await.map_err(|e| {
                error!("[{}] Upstream completion failed: {}", request_id, e);
                e
            })?;
            return Ok(ChatOutcome::Reply(reply));
        }

        let mut chunks = self.relay.stream(&request.conversation).await.map_err(|e| {
            error!("[{}] Upstream stream failed to start: {}", request_id, e);
            e
        })?;

        // Hold the status line until the first chunk shows the upstream is healthy.
        match chunks.next().await {
            Some(Ok(first)) => {
                let head = futures::stream::once(async move { Ok(first) });
                Ok(ChatOutcome::Stream(Box::pin(head.chain(chunks))))
            }
            Some(Err(e)) => {
                error!("[{}] Upstream stream failed before first chunk: {}", request_id, e);
                Err(e.into())
            }
            None => {
                error!("[{}] Upstream stream ended before any content", request_id);
                Err(RelayError::UpstreamMalformed("stream ended without content".to_string()).into())
            }
        }
    }

    async fn admit(&self, request_id: &str, identifier: &str) -> bool {
        match self.limiter.allow(identifier).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("[{}] Rate limit store unavailable, admitting request: {}", request_id, e);
                true
            }
        }
    }
}
