pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod ratelimit;
pub mod server;

use assistant::ChatService;
use cli::Args;
use config::prompt;
use llm::LlmConfig;
use llm::chat::new_client as new_chat_client;
use log::info;
use ratelimit::create_rate_limit_store;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("Chat Base URL: {}", args.chat_base_url.as_deref().unwrap_or("adapter default"));
    info!("Chat API Key Set: {}", args.resolved_chat_api_key().is_some());
    info!("Stream Responses: {}", args.stream_responses);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Greeting Scope: {}", args.greeting_scope);
    info!("Rate Limit Store: {}", args.rate_limit_store);
    if args.rate_limit_store.eq_ignore_ascii_case("redis") {
        info!("Rate Limit Redis URL: {}", args.rate_limit_redis_url);
    }
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let prompts = prompt::load_or_default(args.prompts_path.as_deref())?;
    let llm_config = LlmConfig::from_args(&args)?;
    let chat_client = new_chat_client(&llm_config)?;
    let limiter = create_rate_limit_store(&args).await?;

    let chat = Arc::new(ChatService::from_parts(&args, &prompts, limiter, chat_client)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, chat, args.clone());
    server.run().await?;

    Ok(())
}
