//! Seams to the collaborators that own posts, accounts and search history.
//!
//! Every source is read-only from this crate's point of view. Implementations
//! are expected to return data that is already filtered for visibility,
//! privacy and block lists.

mod memory;
mod redis_accounts;
mod redis_search_history;

use crate::models::{AccountStanding, MediaFilter, Post, SearchHistoryEntry, Viewer};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

pub use memory::InMemoryCatalog;
pub use redis_accounts::RedisAccountDirectory;
pub use redis_search_history::RedisSearchHistory;

/// Organic candidates, newest first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn organic_feed_page(&self, user_id: Option<Uuid>, page: u32, page_size: usize)
        -> Result<Vec<Post>>;

    async fn organic_video_page(
        &self,
        user_id: Option<Uuid>,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<Post>>;

    async fn all_organic_video(&self, user_id: Option<Uuid>) -> Result<Vec<Post>>;
}

/// Search queries for one user, most recent first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchHistorySource: Send + Sync {
    async fn recent_queries(&self, user_id: Uuid, limit: usize) -> Result<Vec<SearchHistoryEntry>>;
}

/// Author tier lookup. Must hit the owning store on every call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Standing of every known author in `author_ids`, in one round trip.
    /// Authors without an account record are absent from the map.
    async fn standings(&self, author_ids: Vec<Uuid>) -> Result<HashMap<Uuid, AccountStanding>>;
}

/// Posts published by business-tier authors, in priority order for `viewer`:
/// businesses the viewer follows, then posts matching `keywords` (the
/// viewer's search terms, strongest first), then everything else.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SponsoredInventory: Send + Sync {
    async fn business_posts(
        &self,
        viewer: Viewer,
        filter: MediaFilter,
        keywords: Vec<String>,
        limit: usize,
    ) -> Result<Vec<Post>>;
}
