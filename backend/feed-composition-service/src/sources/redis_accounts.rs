use super::AccountDirectory;
use crate::models::{AccountStanding, AuthorTier};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use uuid::Uuid;

/// Account tier projection maintained by identity-service.
/// Key: "account:{account_id}:tier" (hash)
/// Fields: `tier` = "user" | "business", `business_expires_at` = rfc3339 (optional)
///
/// Read on every call; nothing is cached here. All lookups for one request go
/// out as a single pipeline over the shared connection.
pub struct RedisAccountDirectory {
    redis: ConnectionManager,
}

impl RedisAccountDirectory {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(account_id: Uuid) -> String {
        format!("account:{}:tier", account_id)
    }
}

fn parse_standing(fields: &HashMap<String, String>) -> Result<Option<AccountStanding>> {
    let Some(tier) = fields.get("tier") else {
        return Ok(None);
    };

    let tier = match tier.to_ascii_lowercase().as_str() {
        "user" => AuthorTier::User,
        "business" => AuthorTier::Business,
        other => return Err(anyhow!("unknown account tier: {}", other)),
    };

    let business_expires_at = match fields.get("business_expires_at") {
        Some(value) if !value.is_empty() => Some(
            DateTime::parse_from_rfc3339(value)
                .with_context(|| format!("invalid business_expires_at: {}", value))?
                .with_timezone(&Utc),
        ),
        _ => None,
    };

    Ok(Some(AccountStanding {
        tier,
        business_expires_at,
    }))
}

#[async_trait]
impl AccountDirectory for RedisAccountDirectory {
    async fn standings(&self, author_ids: Vec<Uuid>) -> Result<HashMap<Uuid, AccountStanding>> {
        if author_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut pipe = redis::pipe();
        for author_id in &author_ids {
            pipe.hgetall(Self::key(*author_id));
        }

        let rows: Vec<HashMap<String, String>> = pipe
            .query_async(&mut self.redis.clone())
            .await
            .context("Failed to fetch account tiers from Redis")?;

        let mut standings = HashMap::with_capacity(rows.len());
        for (author_id, fields) in author_ids.into_iter().zip(rows) {
            if let Some(standing) = parse_standing(&fields)
                .with_context(|| format!("invalid tier record for account {}", author_id))?
            {
                standings.insert(author_id, standing);
            }
        }
        Ok(standings)
    }
}
