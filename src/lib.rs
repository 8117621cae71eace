pub mod cli;
pub mod llm;
pub mod models;
pub mod ratelimit;
pub mod relay;
pub mod server;
pub mod trial;

use cli::Args;
use llm::{ LlmConfig, ProviderApi };
use llm::chat::new_client;
use log::info;
use ratelimit::create_rate_limiter;
use relay::{ ChatRelay, RelayConfig };
use server::Server;
use server::api::AppState;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let provider_api: ProviderApi = args.provider_api.parse()?;
    let relay_config = RelayConfig::from_args(&args);

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Provider API: {}", provider_api);
    info!("Provider Model: {}", args.openai_model);
    info!("Provider Base URL: {}", args.openai_base_url.as_deref().unwrap_or("adapter default"));
    info!("Provider Credential: {}", if args.api_key().is_some() { "set" } else { "missing" });
    info!("History Window: {} turns, {} chars per turn", relay_config.max_turns, relay_config.max_turn_chars);
    info!(
        "Output Bounds: {} (answers), {} (summaries)",
        relay_config.max_output_tokens,
        relay_config.summary_max_output_tokens
    );
    info!("Rate Limit: {} per {}s", args.rate_limit_max, args.rate_limit_window_secs);
    info!("Counter Store: {}", if args.store_url().is_some() { "external" } else { "in-memory" });
    info!("Global Request Guard: {}/s", args.global_requests_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let client = match args.api_key() {
        Some(api_key) => {
            let config = LlmConfig {
                provider_api,
                api_key: Some(api_key),
                model: Some(args.openai_model.clone()),
                base_url: args.openai_base_url.clone(),
            };
            let client = new_client(&config)?;
            info!(
                "Provider client ready (model {}, native streaming: {})",
                client.get_model(),
                client.supports_native_streaming()
            );
            Some(client)
        }
        None => None,
    };

    let limiter = create_rate_limiter(&args).await?;
    let relay = Arc::new(ChatRelay::new(relay_config, client, limiter));
    let state = AppState::new(relay, args.global_requests_per_second);

    let server = Server::new(args, state);
    server.run().await?;

    Ok(())
}
