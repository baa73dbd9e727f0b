use super::{AccountDirectory, CandidateSource, SearchHistorySource, SponsoredInventory};
use crate::models::{
    AccountStanding, AuthorTier, MediaFilter, Post, SearchHistoryEntry, Viewer, Visibility,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct AccountRecord {
    standing: AccountStanding,
    verified_at: Option<DateTime<Utc>>,
}

/// In-process implementation of every collaborator, for tests and embedding.
///
/// Organic pages follow the same rules as the content store: only authors
/// without an active business subscription, public posts for everyone,
/// follower posts for followers, private posts for their owner, and circular
/// pagination when a page runs past the end.
#[derive(Default)]
pub struct InMemoryCatalog {
    posts: RwLock<Vec<Post>>,
    accounts: DashMap<Uuid, AccountRecord>,
    searches: DashMap<Uuid, Vec<SearchHistoryEntry>>,
    follows: DashMap<Uuid, HashSet<Uuid>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_account(
        &self,
        account_id: Uuid,
        standing: AccountStanding,
        verified_at: Option<DateTime<Utc>>,
    ) {
        self.accounts.insert(
            account_id,
            AccountRecord {
                standing,
                verified_at,
            },
        );
    }

    /// Change a business subscription's expiry in place.
    pub fn set_business_expiry(&self, account_id: Uuid, expires_at: Option<DateTime<Utc>>) {
        if let Some(mut record) = self.accounts.get_mut(&account_id) {
            record.standing.business_expires_at = expires_at;
        }
    }

    pub fn add_post(&self, post: Post) {
        self.posts.write().push(post);
    }

    pub fn record_search(&self, user_id: Uuid, query: &str, searched_at: DateTime<Utc>) {
        self.searches
            .entry(user_id)
            .or_default()
            .push(SearchHistoryEntry {
                query: query.to_string(),
                searched_at,
            });
    }

    pub fn follow(&self, follower_id: Uuid, followee_id: Uuid) {
        self.follows.entry(follower_id).or_default().insert(followee_id);
    }

    fn is_following(&self, follower_id: Uuid, followee_id: Uuid) -> bool {
        self.follows
            .get(&follower_id)
            .map(|set| set.contains(&followee_id))
            .unwrap_or(false)
    }

    fn record(&self, account_id: Uuid) -> Option<AccountRecord> {
        self.accounts.get(&account_id).map(|r| *r)
    }

    fn is_active_business(&self, account_id: Uuid, now: DateTime<Utc>) -> bool {
        self.record(account_id)
            .map(|r| r.standing.is_active_business(now))
            .unwrap_or(false)
    }

    fn visible_to(&self, post: &Post, user_id: Option<Uuid>) -> bool {
        match post.visibility {
            Visibility::Public => true,
            Visibility::Private => user_id == Some(post.author_id),
            Visibility::Followers => user_id
                .map(|uid| uid == post.author_id || self.is_following(uid, post.author_id))
                .unwrap_or(false),
        }
    }

    fn organic(&self, user_id: Option<Uuid>, filter: MediaFilter) -> Vec<Post> {
        let now = Utc::now();
        let mut posts: Vec<Post> = self
            .posts
            .read()
            .iter()
            .filter(|p| filter.matches(p.media_type))
            .filter(|p| !self.is_active_business(p.author_id, now))
            .filter(|p| self.visible_to(p, user_id))
            .cloned()
            .collect();
        posts.sort_by_key(|p| Reverse(p.created_at));
        posts
    }
}

/// Page through `posts` with wrap-around; a short tail is topped up from the start.
fn circular_page(posts: &[Post], page: u32, page_size: usize) -> Vec<Post> {
    if posts.is_empty() || page_size == 0 {
        return Vec::new();
    }

    let total = posts.len();
    let start = ((page.max(1) as usize - 1) * page_size) % total;
    posts
        .iter()
        .cycle()
        .skip(start)
        .take(page_size.min(total))
        .cloned()
        .collect()
}

#[async_trait]
impl CandidateSource for InMemoryCatalog {
    async fn organic_feed_page(
        &self,
        user_id: Option<Uuid>,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<Post>> {
        Ok(circular_page(&self.organic(user_id, MediaFilter::Any), page, page_size))
    }

    async fn organic_video_page(
        &self,
        user_id: Option<Uuid>,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<Post>> {
        Ok(circular_page(
            &self.organic(user_id, MediaFilter::VideoOnly),
            page,
            page_size,
        ))
    }

    async fn all_organic_video(&self, user_id: Option<Uuid>) -> Result<Vec<Post>> {
        Ok(self.organic(user_id, MediaFilter::VideoOnly))
    }
}

#[async_trait]
impl SearchHistorySource for InMemoryCatalog {
    async fn recent_queries(&self, user_id: Uuid, limit: usize) -> Result<Vec<SearchHistoryEntry>> {
        let mut entries = self
            .searches
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        entries.sort_by_key(|e| Reverse(e.searched_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryCatalog {
    async fn standings(&self, author_ids: Vec<Uuid>) -> Result<HashMap<Uuid, AccountStanding>> {
        Ok(author_ids
            .into_iter()
            .filter_map(|id| self.record(id).map(|r| (id, r.standing)))
            .collect())
    }
}

#[async_trait]
impl SponsoredInventory for InMemoryCatalog {
    /// Newest post of each followed business first, then posts matching the
    /// viewer's search keywords, then everything else. Within a tier posts are
    /// ordered by verification date and recency. Expiry is left to the caller.
    async fn business_posts(
        &self,
        viewer: Viewer,
        filter: MediaFilter,
        keywords: Vec<String>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let mut posts: Vec<(Post, Option<DateTime<Utc>>)> = self
            .posts
            .read()
            .iter()
            .filter(|p| p.visibility == Visibility::Public && filter.matches(p.media_type))
            .filter_map(|p| {
                let record = self.record(p.author_id)?;
                (record.standing.tier == AuthorTier::Business)
                    .then(|| (p.clone(), record.verified_at))
            })
            .collect();
        posts.sort_by_key(|(p, verified_at)| (Reverse(*verified_at), Reverse(p.created_at)));

        let mut followed_leads: HashSet<Uuid> = HashSet::new();
        if let Some(user_id) = viewer.user_id() {
            let mut led: HashSet<Uuid> = HashSet::new();
            let mut newest: Vec<&Post> = posts
                .iter()
                .map(|(p, _)| p)
                .filter(|p| self.is_following(user_id, p.author_id))
                .collect();
            newest.sort_by_key(|p| Reverse(p.created_at));
            for post in newest {
                if led.insert(post.author_id) {
                    followed_leads.insert(post.id);
                }
            }
        }

        // earlier keywords carry more affinity
        let keyword_rank: HashMap<&str, usize> = keywords
            .iter()
            .enumerate()
            .map(|(i, k)| (k.as_str(), i))
            .collect();

        let mut ordered: Vec<(usize, usize, Post)> = posts
            .into_iter()
            .enumerate()
            .map(|(position, (post, _))| {
                let tier = if followed_leads.contains(&post.id) {
                    0
                } else {
                    post.tokens()
                        .iter()
                        .filter_map(|token| keyword_rank.get(token.as_str()))
                        .min()
                        .map_or(usize::MAX, |rank| 1 + rank)
                };
                (tier, position, post)
            })
            .collect();
        ordered.sort_by_key(|(tier, position, _)| (*tier, *position));

        Ok(ordered
            .into_iter()
            .take(limit)
            .map(|(_, _, post)| post)
            .collect())
    }
}
