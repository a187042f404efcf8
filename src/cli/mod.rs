use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub server_addr: String,

    /// Stream replies as chunked text by default (clients may override per request).
    #[arg(long, env = "STREAM_RESPONSES", default_value = "false")]
    pub stream_responses: bool,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (groq, openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "groq")]
    pub chat_llm_type: String,

    /// Chat completions endpoint for the provider (e.g., http://localhost:11434/v1/chat/completions)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Falls back to GROQ_API_KEY when empty.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., llama-3.1-8b-instant, gpt-4o)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Sampling temperature sent to the provider.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Upper bound on generated tokens per reply.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "1024")]
    pub chat_max_tokens: u32,

    /// Timeout in seconds for a single upstream completion call.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value = "60")]
    pub upstream_timeout_secs: u64,

    // --- Prompt Args ---
    /// Optional JSON file overriding the system prompt and greeting reply.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Which messages the greeting shortcut inspects (last, any)
    #[arg(long, env = "GREETING_SCOPE", default_value = "last")]
    pub greeting_scope: String,

    // --- Rate Limit Args ---
    /// Requests admitted per identifier inside one window.
    #[arg(
        long,
        env = "RATE_LIMIT_MAX_REQUESTS",
        default_value = "10",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub rate_limit_max_requests: u32,

    /// Window length in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "60")]
    pub rate_limit_window_secs: u64,

    /// Rate limit store type (memory, redis)
    #[arg(long, env = "RATE_LIMIT_STORE", default_value = "memory")]
    pub rate_limit_store: String,

    /// Maximum identifiers tracked by the in-memory store before eviction.
    #[arg(long, env = "RATE_LIMIT_CAPACITY", default_value = "10000")]
    pub rate_limit_capacity: usize,

    /// Redis URL for the shared rate limit store.
    #[arg(long, env = "RATE_LIMIT_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub rate_limit_redis_url: String,

    /// Prefix for Redis rate limit keys.
    #[arg(long, env = "RATE_LIMIT_REDIS_PREFIX", default_value = "ratelimit:")]
    pub rate_limit_redis_prefix: String,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// The configured chat key, or `GROQ_API_KEY` when none was given.
    pub fn resolved_chat_api_key(&self) -> Option<String> {
        if !self.chat_api_key.is_empty() {
            return Some(self.chat_api_key.clone());
        }
        std::env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty())
    }
}
