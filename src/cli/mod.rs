use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Requests per second accepted across all callers before answering 503.
    #[arg(long, env = "GLOBAL_REQUESTS_PER_SECOND", default_value = "50")]
    pub global_requests_per_second: u32,

    // --- Chat Provider Args ---
    /// API key for the text-generation provider. Without it the relay answers 500.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Model name forwarded to the provider (e.g., gpt-4.1-mini, gpt-4o)
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4.1-mini")]
    pub openai_model: String,

    /// Base URL of the provider API (e.g., https://api.openai.com/v1)
    #[arg(long, env = "OPENAI_BASE_URL")] // No default, let adapters handle defaults if None
    pub openai_base_url: Option<String>,

    /// Provider API flavour (responses, chat-completions)
    #[arg(long, env = "PROVIDER_API", default_value = "responses")]
    pub provider_api: String,

    // --- Relay Args ---
    /// Most recent conversation turns forwarded to the provider.
    #[arg(long, env = "MAX_HISTORY_TURNS", default_value = "8")]
    pub max_history_turns: usize,

    /// Characters kept from each turn's content.
    #[arg(long, env = "MAX_TURN_CHARS", default_value = "2000")]
    pub max_turn_chars: usize,

    /// Output bound for normal and streaming answers.
    #[arg(long, env = "MAX_OUTPUT_TOKENS", default_value = "300")]
    pub max_output_tokens: u32,

    /// Output bound for summary memos.
    #[arg(long, env = "SUMMARY_MAX_OUTPUT_TOKENS", default_value = "120")]
    pub summary_max_output_tokens: u32,

    // --- Rate Limit Args ---
    /// Accepted submissions per caller within one window.
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "5")]
    pub rate_limit_max: u32,

    /// Window length in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// External counter store (redis://host:6379 or https://<rest-endpoint>). In-memory when unset.
    #[arg(long, env = "RATE_LIMIT_STORE_URL")]
    pub rate_limit_store_url: Option<String>,

    /// Token for the external counter store (password for redis://, bearer token for https://).
    #[arg(long, env = "RATE_LIMIT_STORE_TOKEN")]
    pub rate_limit_store_token: Option<String>,

    /// Prefix for counter keys in the external store.
    #[arg(long, env = "RATE_LIMIT_KEY_PREFIX", default_value = "ratelimit:")]
    pub rate_limit_key_prefix: String,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// Provider credential, treating a blank value as absent.
    pub fn api_key(&self) -> Option<String> {
        self.openai_api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn store_url(&self) -> Option<&str> {
        self.rate_limit_store_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn store_token(&self) -> Option<&str> {
        self.rate_limit_store_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
