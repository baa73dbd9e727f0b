//! Entry points used by the feed and reels handlers.
//!
//! A page request runs the organic candidate fetch concurrently with the
//! sponsored path. The sponsored path loads the viewer's search affinity first,
//! since its keywords steer the business inventory order. Only a failure of the
//! organic source surfaces to the caller; search history and the business side
//! degrade to pass-through ordering and an organic-only page respectively.

use crate::config::CompositionConfig;
use crate::error::{CompositionError, Result};
use crate::models::{CompositionSeed, FeedItem, MediaFilter, PageRequest, Post, Viewer};
use crate::services::{
    AffinityProfile, BusinessEligibilityResolver, FeedComposer, ReelComposer, UserPostPrioritizer,
};
use crate::sources::{
    AccountDirectory, CandidateSource, RedisAccountDirectory, RedisSearchHistory,
    SearchHistorySource, SponsoredInventory,
};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct CompositionService {
    candidates: Arc<dyn CandidateSource>,
    prioritizer: UserPostPrioritizer,
    resolver: Arc<BusinessEligibilityResolver>,
    feed: FeedComposer,
    reels: ReelComposer,
    default_page_size: usize,
    max_page_size: usize,
    anonymous_bucket: u32,
}

impl CompositionService {
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        search_history: Arc<dyn SearchHistorySource>,
        inventory: Arc<dyn SponsoredInventory>,
        accounts: Arc<dyn AccountDirectory>,
        config: &CompositionConfig,
    ) -> Self {
        let resolver = Arc::new(BusinessEligibilityResolver::new(inventory, accounts, config));

        Self {
            candidates,
            prioritizer: UserPostPrioritizer::new(search_history, config),
            feed: FeedComposer::new(resolver.clone(), config.feed_cadence),
            reels: ReelComposer::new(resolver.clone(), config.reel_cadence),
            resolver,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            anonymous_bucket: config.anonymous_bucket,
        }
    }

    /// Search history and account tiers read from Redis projections over one
    /// shared connection.
    pub fn with_redis(
        candidates: Arc<dyn CandidateSource>,
        inventory: Arc<dyn SponsoredInventory>,
        redis: ConnectionManager,
        config: &CompositionConfig,
    ) -> Self {
        Self::new(
            candidates,
            Arc::new(RedisSearchHistory::new(redis.clone())),
            inventory,
            Arc::new(RedisAccountDirectory::new(redis)),
            config,
        )
    }

    pub fn viewer(&self, user_id: Option<Uuid>) -> Viewer {
        Viewer::from_user_id(user_id, self.anonymous_bucket)
    }

    /// Page request from optional query parameters. A missing page means the
    /// first page and a missing size the configured default.
    pub fn page_request(&self, page: Option<u32>, page_size: Option<usize>) -> PageRequest {
        PageRequest::new(page.unwrap_or(1), page_size.unwrap_or(self.default_page_size))
            .clamped(self.max_page_size)
    }

    /// Re-rank an organic page by the viewer's search affinity.
    pub async fn prioritize_and_mix(&self, organic_page: Vec<Post>, viewer: &Viewer) -> Vec<Post> {
        self.prioritizer.prioritize(organic_page, viewer).await
    }

    pub async fn inject_business_into_feed(
        &self,
        prioritized_page: Vec<Post>,
        viewer: Viewer,
        page: PageRequest,
    ) -> Result<Vec<FeedItem>> {
        let page = page.clamped(self.max_page_size);
        let seed = CompositionSeed::new(viewer, page.page, page.page_size);
        let affinity = self.prioritizer.affinity_profile(&viewer).await;
        self.feed.compose(prioritized_page, seed, &affinity).await
    }

    pub async fn inject_business_video_into_reels(
        &self,
        prioritized_video_page: Vec<Post>,
        viewer: Viewer,
        page: PageRequest,
    ) -> Result<Vec<FeedItem>> {
        let page = page.clamped(self.max_page_size);
        let seed = CompositionSeed::new(viewer, page.page, page.page_size);
        let affinity = self.prioritizer.affinity_profile(&viewer).await;
        self.reels
            .compose_page(prioritized_video_page, seed, &affinity)
            .await
    }

    pub async fn inject_business_video_into_all_reels(
        &self,
        prioritized_videos: Vec<Post>,
        viewer: Viewer,
    ) -> Result<Vec<FeedItem>> {
        let affinity = self.prioritizer.affinity_profile(&viewer).await;
        self.reels
            .compose_all(prioritized_videos, viewer, &affinity)
            .await
    }

    /// Fetch, prioritize and compose one home feed page.
    #[instrument(skip(self))]
    pub async fn feed_page(&self, viewer: Viewer, page: PageRequest) -> Result<Vec<FeedItem>> {
        let page = page.clamped(self.max_page_size);
        let seed = CompositionSeed::new(viewer, page.page, page.page_size);
        let slots = self.feed.slot_budget(page.page_size);

        let (organic, (profile, sponsored)) = tokio::join!(
            self.candidates
                .organic_feed_page(viewer.user_id(), page.page, page.page_size),
            self.affinity_and_sponsored(&seed, slots, MediaFilter::Any),
        );
        let organic = organic.map_err(candidate_source_error)?;

        let items = self
            .feed
            .compose_with(profile.apply(organic), sponsored, seed)?;
        info!(items = items.len(), "Feed page served");
        Ok(items)
    }

    /// Fetch, prioritize and compose one page of reels.
    #[instrument(skip(self))]
    pub async fn reels_page(&self, viewer: Viewer, page: PageRequest) -> Result<Vec<FeedItem>> {
        let page = page.clamped(self.max_page_size);
        let seed = CompositionSeed::new(viewer, page.page, page.page_size);
        let slots = self.reels.slot_budget(page.page_size);

        let (organic, (profile, sponsored)) = tokio::join!(
            self.candidates
                .organic_video_page(viewer.user_id(), page.page, page.page_size),
            self.affinity_and_sponsored(&seed, slots, MediaFilter::VideoOnly),
        );
        let organic = organic.map_err(candidate_source_error)?;

        let items = self
            .reels
            .compose_page_with(profile.apply(organic), sponsored, seed)?;
        info!(items = items.len(), "Reels page served");
        Ok(items)
    }

    /// Every organic reel in one response. The sponsored budget depends on the
    /// organic total, so the inventory is consulted after the organic fetch.
    #[instrument(skip(self))]
    pub async fn all_reels(&self, viewer: Viewer) -> Result<Vec<FeedItem>> {
        let (organic, profile) = tokio::join!(
            self.candidates.all_organic_video(viewer.user_id()),
            self.prioritizer.affinity_profile(&viewer),
        );
        let organic = organic.map_err(candidate_source_error)?;

        let items = self
            .reels
            .compose_all(profile.apply(organic), viewer, &profile)
            .await?;
        info!(items = items.len(), "All reels served");
        Ok(items)
    }

    async fn affinity_and_sponsored(
        &self,
        seed: &CompositionSeed,
        slots: usize,
        filter: MediaFilter,
    ) -> (AffinityProfile, Vec<Post>) {
        let profile = self.prioritizer.affinity_profile(&seed.viewer).await;
        let sponsored = self
            .resolver
            .select_sponsored(seed, slots, filter, &profile)
            .await;
        (profile, sponsored)
    }
}

fn candidate_source_error(e: anyhow::Error) -> CompositionError {
    CompositionError::CandidateSource(format!("{:#}", e))
}
