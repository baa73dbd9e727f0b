use crate::error::{CompositionError, Result};
use crate::utils::tokenize;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Mixed,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Followers,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_handle: String,
    pub caption: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub visibility: Visibility,
    pub media_type: MediaType,
}

impl Post {
    /// Lowercased tokens drawn from the author handle, caption and hashtags.
    pub fn tokens(&self) -> HashSet<String> {
        let mut tokens: HashSet<String> = tokenize(&self.author_handle).collect();
        if let Some(caption) = &self.caption {
            tokens.extend(tokenize(caption));
        }
        for tag in &self.hashtags {
            tokens.extend(tokenize(tag));
        }
        tokens
    }

    pub fn is_video(&self) -> bool {
        self.media_type == MediaType::Video
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_nil() {
            return Err(CompositionError::MalformedCandidate {
                post_id: self.id,
                reason: "post id is nil".to_string(),
            });
        }
        if self.author_id.is_nil() {
            return Err(CompositionError::MalformedCandidate {
                post_id: self.id,
                reason: "author id is nil".to_string(),
            });
        }
        if self.author_handle.trim().is_empty() {
            return Err(CompositionError::MalformedCandidate {
                post_id: self.id,
                reason: "author handle is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthorTier {
    User,
    Business,
}

/// Tier and subscription state of an author, resolved per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountStanding {
    pub tier: AuthorTier,
    pub business_expires_at: Option<DateTime<Utc>>,
}

impl AccountStanding {
    /// A business without an expiry timestamp holds an open-ended subscription.
    pub fn is_active_business(&self, now: DateTime<Utc>) -> bool {
        self.tier == AuthorTier::Business
            && self.business_expires_at.map_or(true, |expires| expires > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHistoryEntry {
    pub query: String,
    pub searched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFilter {
    Any,
    VideoOnly,
}

impl MediaFilter {
    pub fn matches(&self, media_type: MediaType) -> bool {
        match self {
            MediaFilter::Any => true,
            MediaFilter::VideoOnly => media_type == MediaType::Video,
        }
    }
}

/// Who is looking at the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Viewer {
    Authenticated(Uuid),
    Anonymous(u32),
}

impl Viewer {
    pub fn from_user_id(user_id: Option<Uuid>, anonymous_bucket: u32) -> Self {
        match user_id {
            Some(id) => Viewer::Authenticated(id),
            None => Viewer::Anonymous(anonymous_bucket),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Viewer::Authenticated(id) => Some(*id),
            Viewer::Anonymous(_) => None,
        }
    }

    fn seed_bytes(&self) -> Vec<u8> {
        match self {
            Viewer::Authenticated(id) => {
                let mut bytes = vec![b'u'];
                bytes.extend_from_slice(id.as_bytes());
                bytes
            }
            Viewer::Anonymous(bucket) => {
                let mut bytes = vec![b'a'];
                bytes.extend_from_slice(&bucket.to_be_bytes());
                bytes
            }
        }
    }
}

/// 1-based page request as received from the calling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: usize,
}

impl PageRequest {
    /// Page 0 is reserved for the unpaginated reels pull.
    pub const ALL: u32 = 0;

    pub fn new(page: u32, page_size: usize) -> Self {
        Self { page, page_size }
    }

    pub fn clamped(self, max_page_size: usize) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size.max(1)),
        }
    }
}

/// Pure selection key for one composed page. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositionSeed {
    pub viewer: Viewer,
    pub page: u32,
    pub page_size: usize,
}

impl CompositionSeed {
    pub fn new(viewer: Viewer, page: u32, page_size: usize) -> Self {
        Self {
            viewer,
            page,
            page_size,
        }
    }

    /// Stable 64-bit key for `post_id` under this seed; identical across processes.
    pub fn selection_key(&self, post_id: &Uuid) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.viewer.seed_bytes());
        hasher.update(self.page.to_be_bytes());
        hasher.update((self.page_size as u64).to_be_bytes());
        hasher.update(post_id.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }
}

/// Organic post annotated for ranking. Transient.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedCandidate {
    pub post: Post,
    pub affinity_score: f32,
}

/// One slot of a composed page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedItem {
    pub post: Post,
    pub is_sponsored: bool,
}

impl FeedItem {
    pub fn organic(post: Post) -> Self {
        Self {
            post,
            is_sponsored: false,
        }
    }

    pub fn sponsored(post: Post) -> Self {
        Self {
            post,
            is_sponsored: true,
        }
    }
}
