use futures::StreamExt;
use log::debug;
use std::sync::Arc;

use crate::error::RelayError;
use crate::llm::chat::{ ChatClient, ChunkStream };
use crate::models::chat::Conversation;

/// Forwards conversations to the upstream model behind the persona prompt.
#[derive(Clone)]
pub struct CompletionRelay {
    client: Arc<dyn ChatClient>,
    system_prompt: String,
}

impl CompletionRelay {
    pub fn new(client: Arc<dyn ChatClient>, system_prompt: impl Into<String>) -> Self {
        Self { client, system_prompt: system_prompt.into() }
    }

    pub async fn complete(&self, conversation: &Conversation) -> Result<String, RelayError> {
        let messages = conversation.with_system_prompt(&self.system_prompt);
        debug!("Relaying {} messages to model {}", messages.len(), self.client.get_model());
        self.client.complete(&messages).await
    }

    pub async fn stream(&self, conversation: &Conversation) -> Result<ChunkStream, RelayError> {
        let messages = conversation.with_system_prompt(&self.system_prompt);
        debug!("Streaming {} messages from model {}", messages.len(), self.client.get_model());
        self.client.stream_completion(&messages).await
    }
}

/// Concatenates chunks in arrival order, stopping at the first error.
pub async fn accumulate(mut stream: ChunkStream) -> Result<String, RelayError> {
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        out.push_str(&chunk?);
    }
    Ok(out)
}
