mod memory;
mod redis;

pub use self::memory::{ spawn_sweeper, InMemoryRateLimitStore, RateLimitRecord };
pub use self::redis::RedisRateLimitStore;

use async_trait::async_trait;
use axum::http::HeaderMap;
use log::info;
use sha2::{ Digest, Sha256 };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::Args;
use crate::error::RateLimitError;

pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitPolicy {
    pub fn from_args(args: &Args) -> Self {
        Self {
            max_requests: args.rate_limit_max_requests,
            window: Duration::from_secs(args.rate_limit_window_secs),
        }
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records a request for `identifier` and reports whether it is admitted.
    async fn allow(&self, identifier: &str) -> Result<bool, RateLimitError>;
}

/// Rate-limit partition key: `x-api-key`, then `authorization`, then anonymous.
///
/// Credentials are never kept as-is: the key is a SHA-256 digest of the header
/// value, so logs and store keys only ever see the hash.
pub fn identifier_from_headers(headers: &HeaderMap) -> String {
    ["x-api-key", "authorization"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(hash_credential)
        .unwrap_or_else(|| ANONYMOUS_IDENTIFIER.to_string())
}

fn hash_credential(credential: &str) -> String {
    format!("key:{}", hex::encode(Sha256::digest(credential.as_bytes())))
}

pub async fn create_rate_limit_store(
    args: &Args
) -> Result<Arc<dyn RateLimitStore>, Box<dyn Error + Send + Sync>> {
    let policy = RateLimitPolicy::from_args(args);
    info!(
        "Rate limit: {} requests per {:?} using {} store",
        policy.max_requests,
        policy.window,
        args.rate_limit_store
    );
    match args.rate_limit_store.to_lowercase().as_str() {
        "memory" => {
            let store = Arc::new(InMemoryRateLimitStore::new(policy, args.rate_limit_capacity));
            spawn_sweeper(store.clone(), policy.window);
            Ok(store as Arc<dyn RateLimitStore>)
        }
        "redis" => {
            let store = RedisRateLimitStore::connect(
                &args.rate_limit_redis_url,
                &args.rate_limit_redis_prefix,
                policy,
            ).await?;
            Ok(Arc::new(store))
        }
        other => Err(format!("Unsupported rate limit store type: {}", other).into()),
    }
}
