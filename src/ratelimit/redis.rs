use async_trait::async_trait;
use ::redis::aio::MultiplexedConnection;
use ::redis::{ Client, Script };
use log::info;

use super::{ RateLimitPolicy, RateLimitStore };
use crate::error::RateLimitError;

// KEYS[1] record hash, ARGV[1] window ms, ARGV[2] max requests.
// Same admission rules as the in-memory store, evaluated atomically on the server clock.
const ALLOW_SCRIPT: &str = r#"
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local window = tonumber(ARGV[1])
local max = tonumber(ARGV[2])
if max <= 0 then
  return 0
end
local count = tonumber(redis.call('HGET', KEYS[1], 'count'))
local start = tonumber(redis.call('HGET', KEYS[1], 'start'))
if count == nil or start == nil or now - start > window then
  redis.call('HSET', KEYS[1], 'count', 1, 'start', now)
  redis.call('PEXPIRE', KEYS[1], window)
  return 1
end
if count >= max then
  return 0
end
redis.call('HSET', KEYS[1], 'count', count + 1, 'start', now)
redis.call('PEXPIRE', KEYS[1], window)
return 1
"#;

/// Shared store for deployments running several instances behind a balancer.
pub struct RedisRateLimitStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    policy: RateLimitPolicy,
    script: Script,
}

impl RedisRateLimitStore {
    pub async fn connect(
        url: &str,
        key_prefix: &str,
        policy: RateLimitPolicy,
    ) -> Result<Self, RateLimitError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis rate limit store at {}", url);
        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
            policy,
            script: Script::new(ALLOW_SCRIPT),
        })
    }

    fn key(&self, identifier: &str) -> String {
        format!("{}{}", self.key_prefix, identifier)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn allow(&self, identifier: &str) -> Result<bool, RateLimitError> {
        let mut conn = self.conn.clone();
        let window_ms = self.policy.window.as_millis().max(1) as u64;
        let admitted: i64 = self.script
            .key(self.key(identifier))
            .arg(window_ms)
            .arg(self.policy.max_requests)
            .invoke_async(&mut conn)
            .await?;
        Ok(admitted == 1)
    }
}
