use async_trait::async_trait;
use log::debug;
use reqwest::{Client as HttpClient, header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION}};
use serde::{Deserialize, Serialize};

use super::{ChatClient, CompletionResponse, GenerationRequest, ProviderError, StreamStep, TextStream, pump_event_stream};
use crate::llm::{LlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Client for OpenAI-compatible Chat Completions gateways.
pub struct CompatibleChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct CompatibleMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompatibleRequest<'a> {
    model: &'a str,
    messages: Vec<CompatibleMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct CompatibleResponse {
    choices: Vec<CompatibleChoice>,
}

#[derive(Deserialize)]
struct CompatibleChoice {
    message: CompatibleReply,
}

#[derive(Deserialize)]
struct CompatibleReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompatibleStreamResponse {
    #[serde(default)]
    choices: Vec<CompatibleStreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompatibleStreamChoice {
    delta: CompatibleDelta,
}

#[derive(Deserialize)]
struct CompatibleDelta {
    content: Option<String>,
}

pub(crate) fn parse_stream_data(data: &str) -> StreamStep {
    if data == "[DONE]" {
        return StreamStep::Done;
    }
    let chunk = match serde_json::from_str::<CompatibleStreamResponse>(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("Skipping undecodable provider chunk: {} ({})", data, e);
            return StreamStep::Skip;
        }
    };
    if let Some(error) = chunk.error {
        return StreamStep::Failed(error.to_string());
    }
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(text) if !text.is_empty() => StreamStep::Fragment(text),
        _ => StreamStep::Skip,
    }
}

impl CompatibleChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self, ProviderError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ProviderError::Config(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| ProviderError::Config("Provider API key is required".to_string()))?;

        Self::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
        )
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn build_request<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> CompatibleRequest<'a> {
        CompatibleRequest {
            model: &self.model,
            messages: request.turns
                .iter()
                .map(|t| CompatibleMessage { role: t.role.as_str(), content: &t.content })
                .collect(),
            max_tokens: request.max_output_tokens,
            stream: stream.then_some(true),
        }
    }
}

#[async_trait]
impl ChatClient for CompatibleChatClient {
    async fn complete(
        &self,
        request: &GenerationRequest
    ) -> Result<CompletionResponse, ProviderError> {
        let req = self.build_request(request, false);

        let resp = self.http.post(self.endpoint())
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<CompatibleResponse>()
            .await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or(ProviderError::EmptyResponse)?
            .message.content
            .unwrap_or_default();

        Ok(CompletionResponse { response: content })
    }

    async fn complete_stream(
        &self,
        request: &GenerationRequest
    ) -> Result<TextStream, ProviderError> {
        let req = self.build_request(request, true);

        let resp = self.http.post(self.endpoint())
            .json(&req)
            .send()
            .await?
            .error_for_status()?;

        Ok(pump_event_stream(resp, parse_stream_data))
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_content_becomes_a_fragment() {
        let data = r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(parse_stream_data(data), StreamStep::Fragment("Hi".into()));
    }

    #[test]
    fn role_only_and_finish_chunks_are_skipped() {
        let role = r#"{"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        let stop = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_stream_data(role), StreamStep::Skip);
        assert_eq!(parse_stream_data(stop), StreamStep::Skip);
        assert_eq!(parse_stream_data("[DONE]"), StreamStep::Done);
    }

    #[test]
    fn error_chunks_fail_the_stream() {
        let data = r#"{"error":{"message":"overloaded"}}"#;
        assert!(matches!(parse_stream_data(data), StreamStep::Failed(_)));
    }

    #[test]
    fn endpoint_is_appended_once() {
        let client = CompatibleChatClient::new(
            "key".into(),
            Some("llama3".into()),
            Some("http://localhost:11434/v1".into())
        ).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert_eq!(client.get_model(), "llama3");
    }
}
