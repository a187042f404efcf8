pub mod completions;
pub mod sse;

use async_trait::async_trait;
use futures::{ Future, Stream };
use log::info;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::LlmConfig;
use self::completions::CompletionsClient;
use crate::error::RelayError;
use crate::models::chat::ChatMessage;

/// Reply fragments in arrival order. Dropping it cancels the upstream read.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, RelayError>> + Send>>;

pub type ChunkSender = mpsc::Sender<Result<String, RelayError>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RelayError>;

    /// Providers without native streaming hand back the whole reply as one chunk.
    async fn stream_completion(&self, messages: &[ChatMessage]) -> Result<ChunkStream, RelayError> {
        let reply = self.complete(messages).await?;
        Ok(full_response_as_stream(reply))
    }

    fn get_model(&self) -> String;
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> ChunkStream
where
    F: FnOnce(ChunkSender) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn full_response_as_stream(response: String) -> ChunkStream {
    Box::pin(futures::stream::once(async move { Ok(response) }))
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = CompletionsClient::from_config(config)?;
    info!(
        "Chat client configured: Type={}, Model={}, URL={}",
        config.llm_type,
        client.get_model(),
        client.endpoint()
    );
    Ok(Arc::new(client))
}
