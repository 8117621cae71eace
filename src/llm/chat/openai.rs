use async_trait::async_trait;
use log::debug;
use reqwest::{Client as HttpClient, header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION}};
use serde::{Deserialize, Serialize};

use super::{ChatClient, CompletionResponse, GenerationRequest, ProviderError, StreamStep, TextStream, pump_event_stream};
use crate::llm::{LlmConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::models::chat::Turn;

/// Client for the OpenAI Responses API (`POST {base}/responses`).
pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIResponsesRequest<'a> {
    model: &'a str,
    input: Vec<InputMessage<'a>>,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponsesStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl OpenAIResponsesResponse {
    fn text(&self) -> String {
        if let Some(text) = &self.output_text {
            return text.clone();
        }
        self.output
            .iter()
            .filter(|item| item.item_type == "message")
            .flat_map(|item| item.content.iter())
            .filter(|c| c.content_type == "output_text")
            .filter_map(|c| c.text.as_deref())
            .collect()
    }
}

fn input_messages(turns: &[Turn]) -> Vec<InputMessage<'_>> {
    turns
        .iter()
        .map(|t| InputMessage { role: t.role.as_str(), content: &t.content })
        .collect()
}

pub(crate) fn parse_stream_data(data: &str) -> StreamStep {
    if data == "[DONE]" {
        return StreamStep::Done;
    }
    let event = match serde_json::from_str::<OpenAIResponsesStreamEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            debug!("Skipping undecodable provider event: {} ({})", data, e);
            return StreamStep::Skip;
        }
    };
    match event.event_type.as_str() {
        "response.output_text.delta" => match event.delta {
            Some(delta) if !delta.is_empty() => StreamStep::Fragment(delta),
            _ => StreamStep::Skip,
        },
        // `incomplete` is sent when the output bound is reached; the text so far is the answer.
        "response.completed" | "response.incomplete" => StreamStep::Done,
        "response.failed" | "error" => {
            StreamStep::Failed(event.message.unwrap_or(event.event_type))
        }
        _ => StreamStep::Skip,
    }
}

impl OpenAIChatClient {
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
            .ok_or_else(|| ProviderError::Config("OpenAI API key is required".to_string()))?;

        Self::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
        )
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/responses") {
            base.to_string()
        } else {
            format!("{}/responses", base)
        }
    }

    fn build_request<'a>(&'a self, request: &'a GenerationRequest, stream: bool) -> OpenAIResponsesRequest<'a> {
        OpenAIResponsesRequest {
            model: &self.model,
            input: input_messages(&request.turns),
            max_output_tokens: request.max_output_tokens,
            stream: stream.then_some(true),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
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
            .json::<OpenAIResponsesResponse>()
            .await?;

        Ok(CompletionResponse { response: resp.text() })
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
    use crate::models::chat::Role;

    #[test]
    fn delta_events_become_fragments() {
        let step = parse_stream_data(r#"{"type":"response.output_text.delta","delta":"Hel"}"#);
        assert_eq!(step, StreamStep::Fragment("Hel".into()));
    }

    #[test]
    fn lifecycle_events_are_skipped_until_completion() {
        assert_eq!(parse_stream_data(r#"{"type":"response.created"}"#), StreamStep::Skip);
        assert_eq!(parse_stream_data(r#"{"type":"response.completed"}"#), StreamStep::Done);
        assert_eq!(parse_stream_data("not json"), StreamStep::Skip);
    }

    #[test]
    fn hitting_the_output_bound_completes_the_stream() {
        let data = r#"{"type":"response.incomplete","response":{"incomplete_details":{"reason":"max_output_tokens"}}}"#;
        assert_eq!(parse_stream_data(data), StreamStep::Done);
        let failed = r#"{"type":"response.failed","message":"server_error"}"#;
        assert_eq!(parse_stream_data(failed), StreamStep::Failed("server_error".into()));
    }

    #[test]
    fn failure_events_carry_their_message() {
        let step = parse_stream_data(r#"{"type":"error","message":"quota"}"#);
        assert_eq!(step, StreamStep::Failed("quota".into()));
    }

    #[test]
    fn output_text_is_collected_from_message_items() {
        let body = r#"{
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Primary endpoints "},
                    {"type": "output_text", "text": "include HbA1c."}
                ]}
            ]
        }"#;
        let resp: OpenAIResponsesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.text(), "Primary endpoints include HbA1c.");
    }

    #[test]
    fn request_carries_roles_and_output_bound() {
        let client = OpenAIChatClient::new("sk-test".into(), None, Some("http://localhost/v1/".into())).unwrap();
        let request = GenerationRequest {
            turns: vec![Turn::system("be brief"), Turn::new(Role::User, "hi")],
            max_output_tokens: 300,
        };
        let body = serde_json::to_value(client.build_request(&request, true)).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_output_tokens"], 300);
        assert_eq!(body["stream"], true);
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][1]["content"], "hi");
        assert_eq!(client.endpoint(), "http://localhost/v1/responses");
    }
}
