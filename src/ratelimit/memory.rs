use async_trait::async_trait;
use log::{ debug, info };
use std::collections::{ BTreeSet, HashMap };
use std::sync::{ Arc, Mutex, MutexGuard };
use std::time::{ Duration, Instant };
use tokio::task::JoinHandle;

use super::{ RateLimitPolicy, RateLimitStore };
use crate::error::RateLimitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub count: u32,
    /// Time of the last admitted request; the window is measured from here.
    pub window_start: Instant,
}

/// Records keyed by identifier, plus the same entries ordered by `window_start`
/// so the oldest one is always at the front.
#[derive(Default)]
struct Records {
    by_id: HashMap<String, RateLimitRecord>,
    by_age: BTreeSet<(Instant, String)>,
}

impl Records {
    fn put(&mut self, identifier: &str, record: RateLimitRecord) {
        if let Some(previous) = self.by_id.insert(identifier.to_string(), record) {
            self.by_age.remove(&(previous.window_start, identifier.to_string()));
        }
        self.by_age.insert((record.window_start, identifier.to_string()));
    }

    fn pop_oldest(&mut self) -> Option<String> {
        let (_, identifier) = self.by_age.pop_first()?;
        self.by_id.remove(&identifier);
        Some(identifier)
    }

    /// Removes records idle for longer than `window`, oldest first.
    fn drop_expired(&mut self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        while let Some(&(start, _)) = self.by_age.first() {
            if now.saturating_duration_since(start) <= window {
                break;
            }
            self.pop_oldest();
            removed += 1;
        }
        removed
    }
}

/// Process-local store, bounded to `capacity` identifiers.
pub struct InMemoryRateLimitStore {
    policy: RateLimitPolicy,
    capacity: usize,
    records: Mutex<Records>,
}

impl InMemoryRateLimitStore {
    pub fn new(policy: RateLimitPolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity: capacity.max(1),
            records: Mutex::new(Records::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, RateLimitError> {
        self.records
            .lock()
            .map_err(|e| RateLimitError::Store(format!("rate limit map poisoned: {}", e)))
    }

    pub fn allow_at(&self, identifier: &str, now: Instant) -> Result<bool, RateLimitError> {
        if self.policy.max_requests == 0 {
            return Ok(false);
        }
        let mut records = self.lock()?;

        if let Some(record) = records.by_id.get(identifier).copied() {
            if now.saturating_duration_since(record.window_start) > self.policy.window {
                records.put(identifier, RateLimitRecord { count: 1, window_start: now });
                return Ok(true);
            }
            if record.count >= self.policy.max_requests {
                return Ok(false);
            }
            records.put(identifier, RateLimitRecord { count: record.count + 1, window_start: now });
            return Ok(true);
        }

        if records.by_id.len() >= self.capacity {
            records.drop_expired(now, self.policy.window);
        }
        if records.by_id.len() >= self.capacity {
            if let Some(evicted) = records.pop_oldest() {
                debug!("Rate limit store full, evicting '{}'", evicted);
            }
        }

        records.put(identifier, RateLimitRecord { count: 1, window_start: now });
        Ok(true)
    }

    /// Drops every record whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        match self.lock() {
            Ok(mut records) => records.drop_expired(now, self.policy.window),
            Err(_) => 0,
        }
    }

    pub fn record(&self, identifier: &str) -> Option<RateLimitRecord> {
        self.lock().ok()?.by_id.get(identifier).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn allow(&self, identifier: &str) -> Result<bool, RateLimitError> {
        self.allow_at(identifier, Instant::now())
    }
}

pub fn spawn_sweeper(store: Arc<InMemoryRateLimitStore>, every: Duration) -> JoinHandle<()> {
    let period = every.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep(Instant::now());
            if removed > 0 {
                info!("Swept {} expired rate limit records", removed);
            }
        }
    })
}
