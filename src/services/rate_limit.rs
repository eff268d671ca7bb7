//! Fixed-window request counter keyed by user id.
//!
//! Counts live in Redis when it is configured so every instance shares them,
//! and in process memory otherwise.

use crate::config::rate_limit::UserWindowRule;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::sync::Arc;

const MEMORY_SWEEP_THRESHOLD: usize = 10_000;

/// Index of the window containing `now_secs`.
fn window_id(now_secs: u64, window_secs: u64) -> u64 {
    now_secs / window_secs.max(1)
}

/// Seconds until the window containing `now_secs` closes.
fn seconds_left(now_secs: u64, window_secs: u64) -> u64 {
    let window = window_secs.max(1);
    (window - now_secs % window).max(1)
}

/// `Some(retry_after)` once `count` (including this request) exceeds the budget.
pub fn over_limit(count: u64, rule: UserWindowRule, now_secs: u64) -> Option<u64> {
    (count > u64::from(rule.max_requests)).then(|| seconds_left(now_secs, rule.window_secs))
}

#[derive(Clone)]
enum Store {
    Redis(ConnectionManager),
    Memory,
}

#[derive(Clone)]
pub struct UserRateLimiter {
    rule: UserWindowRule,
    store: Store,
    // (window id, count) per user; also the fallback when Redis errors.
    memory: Arc<DashMap<i32, (u64, u64)>>,
}

impl UserRateLimiter {
    pub fn new(rule: UserWindowRule, redis: Option<ConnectionManager>) -> Self {
        Self {
            rule,
            store: redis.map(Store::Redis).unwrap_or(Store::Memory),
            memory: Arc::new(DashMap::new()),
        }
    }

    pub fn in_memory(rule: UserWindowRule) -> Self {
        Self::new(rule, None)
    }

    /// Count one request for `user_id`. Returns the seconds to wait when over budget.
    pub async fn hit(&self, user_id: i32) -> Option<u64> {
        let now_secs = chrono::Utc::now().timestamp().max(0) as u64;
        self.hit_at(user_id, now_secs).await
    }

    async fn hit_at(&self, user_id: i32, now_secs: u64) -> Option<u64> {
        let count = match &self.store {
            Store::Redis(conn) => match self.incr_redis(conn.clone(), user_id, now_secs).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!("Redis rate limit counter failed, using memory: {}", e);
                    self.incr_memory(user_id, now_secs)
                }
            },
            Store::Memory => self.incr_memory(user_id, now_secs),
        };
        over_limit(count, self.rule, now_secs)
    }

    async fn incr_redis(
        &self,
        mut conn: ConnectionManager,
        user_id: i32,
        now_secs: u64,
    ) -> redis::RedisResult<u64> {
        let key = format!(
            "rate_limit:user:{}:{}",
            user_id,
            window_id(now_secs, self.rule.window_secs)
        );
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(&key, 1u64)
            .expire(&key, self.rule.window_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    fn incr_memory(&self, user_id: i32, now_secs: u64) -> u64 {
        let current = window_id(now_secs, self.rule.window_secs);

        if self.memory.len() > MEMORY_SWEEP_THRESHOLD {
            self.memory.retain(|_, (window, _)| *window == current);
        }

        let mut entry = self.memory.entry(user_id).or_insert((current, 0));
        if entry.0 != current {
            *entry = (current, 0);
        }
        entry.1 += 1;
        entry.1
    }
}
