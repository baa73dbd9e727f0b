use super::SearchHistorySource;
use crate::models::SearchHistoryEntry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

/// Search history kept by search-service in a Redis list.
/// Key: "user:{user_id}:search_history" (LPUSH, newest at the head)
/// Value: JSON `{"query": "...", "searched_at": "<rfc3339>"}`
pub struct RedisSearchHistory {
    redis: ConnectionManager,
}

impl RedisSearchHistory {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(user_id: Uuid) -> String {
        format!("user:{}:search_history", user_id)
    }
}

/// Entries that fail to parse are skipped rather than failing the whole read.
fn parse_entries(raw: Vec<String>) -> Vec<SearchHistoryEntry> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_str::<SearchHistoryEntry>(&value) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unparseable search history entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl SearchHistorySource for RedisSearchHistory {
    async fn recent_queries(&self, user_id: Uuid, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let raw: Vec<String> = conn
            .lrange(Self::key(user_id), 0, (limit - 1) as isize)
            .await
            .context("Failed to fetch search history from Redis")?;

        Ok(parse_entries(raw))
    }
}
