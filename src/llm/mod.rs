pub mod chat;
pub mod sse;
use serde::{ Deserialize, Serialize };
use std::str::FromStr;
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Wire flavour spoken with the upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderApi {
    Responses,
    ChatCompletions,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseProviderApiError {
    message: String,
}

impl fmt::Display for ParseProviderApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseProviderApiError {}
impl FromStr for ProviderApi {
    type Err = ParseProviderApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "responses" | "openai" => Ok(ProviderApi::Responses),
            "chat-completions" | "chat" | "openai-compatible" => Ok(ProviderApi::ChatCompletions),
            _ =>
                Err(ParseProviderApiError {
                    message: format!("Invalid provider API: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for ProviderApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderApi::Responses => write!(f, "responses"),
            ProviderApi::ChatCompletions => write!(f, "chat-completions"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider_api: ProviderApi,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider_api: ProviderApi::Responses,
            api_key: None,
            model: None,
            base_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_aliases() {
        assert_eq!("Responses".parse::<ProviderApi>(), Ok(ProviderApi::Responses));
        assert_eq!("chat-completions".parse::<ProviderApi>(), Ok(ProviderApi::ChatCompletions));
        assert_eq!("openai-compatible".parse::<ProviderApi>(), Ok(ProviderApi::ChatCompletions));
        assert!("gemini".parse::<ProviderApi>().is_err());
    }
}
