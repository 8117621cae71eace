//! Chat relay: validates a conversation, applies the caller's rate limit, bounds
//! the history and forwards it to the configured provider in one of three modes.

use log::{ debug, info, warn };
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::llm::chat::{ ChatClient, GenerationRequest, ProviderError, TextStream };
use crate::models::chat::{ ChatRequest, Role, Turn };
use crate::ratelimit::{ RateLimitError, RateLimiter };

pub const SYSTEM_INSTRUCTION: &str =
    "You are a clinical trial optimization research assistant. Provide concise, research-oriented responses. Avoid medical advice and avoid making clinical decisions.";

pub const SUMMARY_INSTRUCTION: &str =
    "Summarize the conversation so far as a short, neutral research memo of two or three sentences. Do not add new claims, medical advice, or clinical recommendations.";

pub const SUMMARY_LABEL: &str = "Summary memo: ";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Method not allowed.")]
    MethodNotAllowed,
    #[error("Missing OPENAI_API_KEY.")]
    MissingCredential,
    #[error("Rate limit exceeded.")]
    RateLimited,
    #[error("Invalid messages payload.")]
    InvalidPayload,
    #[error("provider call failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("rate limit check failed: {0}")]
    RateStore(#[from] RateLimitError),
}

impl RelayError {
    /// Message safe to return to the caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed => "Method not allowed.",
            RelayError::MissingCredential => "Missing OPENAI_API_KEY.",
            RelayError::RateLimited => "Rate limit exceeded.",
            RelayError::InvalidPayload => "Invalid messages payload.",
            RelayError::Provider(_) | RelayError::RateStore(_) => "Unexpected server error.",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, RelayError::Provider(_) | RelayError::RateStore(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Normal,
    Streaming,
    Summary,
}

impl RelayMode {
    /// A memo is a single answer, so `summary` wins over `stream`.
    pub fn from_flags(stream: bool, summary: bool) -> Self {
        match (stream, summary) {
            (_, true) => RelayMode::Summary,
            (true, false) => RelayMode::Streaming,
            (false, false) => RelayMode::Normal,
        }
    }
}

pub enum RelayOutcome {
    Text(String),
    Summary(String),
    Stream(TextStream),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub max_turns: usize,
    pub max_turn_chars: usize,
    pub max_output_tokens: u32,
    pub summary_max_output_tokens: u32,
    pub system_instruction: String,
    pub summary_instruction: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            max_turn_chars: 2000,
            max_output_tokens: 300,
            summary_max_output_tokens: 120,
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            summary_instruction: SUMMARY_INSTRUCTION.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            max_turns: args.max_history_turns.max(1),
            max_turn_chars: args.max_turn_chars.max(1),
            max_output_tokens: args.max_output_tokens,
            summary_max_output_tokens: args.summary_max_output_tokens,
            ..Self::default()
        }
    }
}

/// Decodes a request body into validated turns.
pub fn parse_turns(body: &[u8]) -> Result<Vec<Turn>, RelayError> {
    let request: ChatRequest = serde_json::from_slice(body).map_err(|e| {
        debug!("Rejecting undecodable chat body: {}", e);
        RelayError::InvalidPayload
    })?;
    validate_turns(&request.messages)?;
    Ok(request.messages)
}

/// Role membership is enforced by the decoder; this checks the sequence and contents.
pub fn validate_turns(turns: &[Turn]) -> Result<(), RelayError> {
    if turns.is_empty() {
        return Err(RelayError::InvalidPayload);
    }
    if turns.iter().any(|t| t.content.trim().is_empty()) {
        return Err(RelayError::InvalidPayload);
    }
    Ok(())
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Keeps the most recent `max_turns` turns, each cut to `max_chars` characters.
pub fn bound_history(turns: &[Turn], max_turns: usize, max_chars: usize) -> Vec<Turn> {
    let start = turns.len().saturating_sub(max_turns);
    turns[start..]
        .iter()
        .map(|t| Turn::new(t.role, truncate_chars(&t.content, max_chars)))
        .collect()
}

/// User and assistant turns only, each cut to `max_chars` characters.
pub fn summary_history(turns: &[Turn], max_chars: usize) -> Vec<Turn> {
    turns
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| Turn::new(t.role, truncate_chars(&t.content, max_chars)))
        .collect()
}

fn with_instruction(instruction: &str, turns: Vec<Turn>) -> Vec<Turn> {
    let mut input = Vec::with_capacity(turns.len() + 1);
    input.push(Turn::system(instruction));
    input.extend(turns);
    input
}

pub struct ChatRelay {
    config: RelayConfig,
    client: Option<Arc<dyn ChatClient>>,
    limiter: Arc<dyn RateLimiter>,
}

impl ChatRelay {
    pub fn new(
        config: RelayConfig,
        client: Option<Arc<dyn ChatClient>>,
        limiter: Arc<dyn RateLimiter>
    ) -> Self {
        if client.is_none() {
            warn!("No provider credential configured; chat requests will be answered with 500.");
        }
        Self { config, client, limiter }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn limiter_backend(&self) -> &'static str {
        self.limiter.backend()
    }

    pub fn model(&self) -> Option<String> {
        self.client.as_ref().map(|c| c.get_model())
    }

    /// Provider request for an accepted conversation in `mode`.
    pub fn build_request(&self, turns: &[Turn], mode: RelayMode) -> GenerationRequest {
        match mode {
            RelayMode::Summary => GenerationRequest {
                turns: with_instruction(
                    &self.config.summary_instruction,
                    summary_history(turns, self.config.max_turn_chars)
                ),
                max_output_tokens: self.config.summary_max_output_tokens,
            },
            RelayMode::Normal | RelayMode::Streaming => GenerationRequest {
                turns: with_instruction(
                    &self.config.system_instruction,
                    bound_history(turns, self.config.max_turns, self.config.max_turn_chars)
                ),
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }

    /// Runs the checks in order (credential, rate limit, payload) and calls the provider.
    pub async fn handle(
        &self,
        client_key: &str,
        body: &[u8],
        mode: RelayMode
    ) -> Result<RelayOutcome, RelayError> {
        let provider = self.client.as_ref().ok_or(RelayError::MissingCredential)?;

        let decision = self.limiter.check(client_key).await?;
        if !decision.allowed {
            info!(
                "Rate limit hit for {} ({} of {} in window)",
                client_key,
                decision.count,
                decision.limit
            );
            return Err(RelayError::RateLimited);
        }

        let turns = parse_turns(body)?;
        let request = self.build_request(&turns, mode);
        debug!(
            "Forwarding {} turns ({:?}) with output bound {}",
            request.turns.len(),
            mode,
            request.max_output_tokens
        );

        match mode {
            RelayMode::Normal => {
                let response = provider.complete(&request).await?;
                Ok(RelayOutcome::Text(response.response))
            }
            RelayMode::Streaming => {
                let stream = provider.complete_stream(&request).await?;
                Ok(RelayOutcome::Stream(stream))
            }
            RelayMode::Summary => {
                let response = provider.complete(&request).await?;
                Ok(RelayOutcome::Summary(format!("{}{}", SUMMARY_LABEL, response.response)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> Turn {
        Turn::new(Role::User, content)
    }

    #[test]
    fn accepts_every_known_role_with_content() {
        let turns = vec![
            Turn::system("context"),
            user("question"),
            Turn::new(Role::Assistant, "answer"),
        ];
        assert!(validate_turns(&turns).is_ok());
    }

    #[test]
    fn rejects_empty_and_blank_conversations() {
        assert!(validate_turns(&[]).is_err());
        assert!(validate_turns(&[user("ok"), user("  \n\t")]).is_err());
        assert!(validate_turns(&[user("")]).is_err());
    }

    #[test]
    fn parse_rejects_unknown_roles_and_non_text_content() {
        assert!(parse_turns(br#"{"messages":[{"role":"alien","content":"hi"}]}"#).is_err());
        assert!(parse_turns(br#"{"messages":[{"role":"user","content":42}]}"#).is_err());
        assert!(parse_turns(br#"{"messages":"hello"}"#).is_err());
        assert!(parse_turns(b"not json").is_err());
        assert!(parse_turns(br#"{"messages":[]}"#).is_err());
        assert_eq!(parse_turns(br#"{"messages":[{"role":"user","content":"hi"}]}"#).unwrap().len(), 1);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 10), "short");
    }

    #[test]
    fn history_keeps_most_recent_turns() {
        let turns: Vec<Turn> = (0..12).map(|i| user(&format!("q{}", i))).collect();
        let bounded = bound_history(&turns, 8, 2000);
        assert_eq!(bounded.len(), 8);
        assert_eq!(bounded[0].content, "q4");
        assert_eq!(bounded[7].content, "q11");
    }

    #[test]
    fn bounding_is_idempotent() {
        let long = "x".repeat(2500);
        let turns: Vec<Turn> = (0..10)
            .map(|i| if i % 2 == 0 { user(&long) } else { Turn::new(Role::Assistant, "é".repeat(2100)) })
            .collect();
        let once = bound_history(&turns, 8, 2000);
        let twice = bound_history(&once, 8, 2000);
        assert_eq!(once, twice);
        assert!(once.iter().all(|t| t.content.chars().count() <= 2000));
    }

    #[test]
    fn summary_history_drops_system_turns() {
        let turns = vec![
            Turn::system("Summary memo: earlier"),
            user("a"),
            Turn::new(Role::Assistant, "b"),
            Turn::system("note"),
        ];
        let kept = summary_history(&turns, 2000);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|t| t.role != Role::System));
    }

    #[test]
    fn summary_flag_wins_over_stream() {
        assert_eq!(RelayMode::from_flags(true, true), RelayMode::Summary);
        assert_eq!(RelayMode::from_flags(true, false), RelayMode::Streaming);
        assert_eq!(RelayMode::from_flags(false, false), RelayMode::Normal);
    }

    #[test]
    fn internal_errors_hide_their_detail() {
        let err = RelayError::Provider(ProviderError::Upstream("secret detail".into()));
        assert!(err.is_internal());
        assert_eq!(err.public_message(), "Unexpected server error.");
        assert_eq!(RelayError::RateLimited.public_message(), "Rate limit exceeded.");
    }
}
