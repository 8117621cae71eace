pub mod openai;
pub mod openai_compatible;

use async_trait::async_trait;
use futures::{ Stream, StreamExt, Future };
use log::debug;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use super::{ LlmConfig, ProviderApi };
use super::sse::SseDecoder;
use self::openai::OpenAIChatClient;
use self::openai_compatible::CompatibleChatClient;
use crate::models::chat::Turn;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("provider reported a failure: {0}")]
    Upstream(String),
    #[error("provider returned no output")]
    EmptyResponse,
    #[error("provider configuration invalid: {0}")]
    Config(String),
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// One bounded conversation handed to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub turns: Vec<Turn>,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        request: &GenerationRequest
    ) -> Result<CompletionResponse, ProviderError>;

    /// Incremental variant of `complete`. Providers without native streaming
    /// deliver the whole answer as a single fragment.
    async fn complete_stream(
        &self,
        request: &GenerationRequest
    ) -> Result<TextStream, ProviderError> {
        let response = self.complete(request).await?;
        Ok(full_response_as_stream(response.response))
    }

    fn get_model(&self) -> String;
    fn supports_native_streaming(&self) -> bool {
        false
    }
}

/// What one upstream `data:` payload means for the relay.
#[derive(Debug, PartialEq)]
pub enum StreamStep {
    Fragment(String),
    Skip,
    Done,
    Failed(String),
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> TextStream
where
    F: FnOnce(mpsc::Sender<Result<String, ProviderError>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn full_response_as_stream(response: String) -> TextStream {
    let fragment = Some(response).filter(|r| !r.is_empty()).map(Ok);
    Box::pin(futures::stream::iter(fragment))
}

/// Forwards the fragments of an already-accepted upstream event stream.
///
/// The forwarding task waits on the upstream body and on the receiving side at
/// the same time, so a client that disconnects releases the upstream call even
/// while the provider is quiet. An upstream that closes before its terminal
/// event ends the stream with an error.
pub fn pump_event_stream(
    resp: reqwest::Response,
    parse_data: fn(&str) -> StreamStep
) -> TextStream {
    create_streaming_response(move |tx| async move {
        let mut decoder = SseDecoder::new();
        let mut bytes = resp.bytes_stream();

        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("Downstream closed; dropping upstream stream");
                    return;
                }
                next = bytes.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    let _ = tx.send(Err(ProviderError::Http(e))).await;
                    return;
                }
                None => {
                    let _ = tx.send(Err(ProviderError::Upstream("stream ended early".into()))).await;
                    return;
                }
            };

            for data in decoder.push(&chunk) {
                match parse_data(&data) {
                    StreamStep::Fragment(text) => {
                        if tx.send(Ok(text)).await.is_err() {
                            debug!("Downstream closed; dropping upstream stream");
                            return;
                        }
                    }
                    StreamStep::Skip => {}
                    StreamStep::Done => {
                        return;
                    }
                    StreamStep::Failed(message) => {
                        let _ = tx.send(Err(ProviderError::Upstream(message))).await;
                        return;
                    }
                }
            }
        }
    })
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, ProviderError> {
    let client: Arc<dyn ChatClient> = match config.provider_api {
        ProviderApi::Responses => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        ProviderApi::ChatCompletions => {
            let specific_client = CompatibleChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}
