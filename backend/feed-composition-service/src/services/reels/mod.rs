use crate::error::Result;
use crate::models::{CompositionSeed, FeedItem, MediaFilter, PageRequest, Post, Viewer};
use crate::services::{AffinityProfile, BusinessEligibilityResolver, FeedComposer};
use std::sync::Arc;
use tracing::warn;

/// Reel Variant - 影片專用的混排
///
/// Same interleaving as the feed, restricted to video on both the organic and
/// the sponsored side, with its own cadence. The "all reels" pull composes the
/// entire organic video set as one page fixed at [`PageRequest::ALL`], with a
/// single slot budget derived from the organic total.
pub struct ReelComposer {
    composer: FeedComposer,
}

impl ReelComposer {
    pub fn new(resolver: Arc<BusinessEligibilityResolver>, cadence: usize) -> Self {
        Self {
            composer: FeedComposer::new(resolver, cadence).with_media_filter(MediaFilter::VideoOnly),
        }
    }

    pub fn cadence(&self) -> usize {
        self.composer.cadence()
    }

    pub fn slot_budget(&self, organic_or_page_size: usize) -> usize {
        self.composer.slot_budget(organic_or_page_size)
    }

    /// Slot budget and seed for the unpaginated pull over `total` organic reels.
    /// The page is sized to hold every organic reel plus every slot.
    pub fn all_reels_seed(&self, viewer: Viewer, total: usize) -> (CompositionSeed, usize) {
        let slots = self.slot_budget(total);
        (CompositionSeed::new(viewer, PageRequest::ALL, total + slots), slots)
    }

    pub async fn compose_page(
        &self,
        organic: Vec<Post>,
        seed: CompositionSeed,
        affinity: &AffinityProfile,
    ) -> Result<Vec<FeedItem>> {
        let items = self.composer.compose(videos_only(organic), seed, affinity).await?;
        debug_assert!(items.iter().all(|item| item.post.is_video()));
        Ok(items)
    }

    pub fn compose_page_with(
        &self,
        organic: Vec<Post>,
        sponsored: Vec<Post>,
        seed: CompositionSeed,
    ) -> Result<Vec<FeedItem>> {
        self.composer
            .compose_with(videos_only(organic), videos_only(sponsored), seed)
    }

    /// Compose every organic reel at once; the sponsored budget scales with the total.
    pub async fn compose_all(
        &self,
        organic: Vec<Post>,
        viewer: Viewer,
        affinity: &AffinityProfile,
    ) -> Result<Vec<FeedItem>> {
        let organic = videos_only(organic);
        let (seed, slots) = self.all_reels_seed(viewer, organic.len());
        let items = self
            .composer
            .compose_slots(organic, seed, slots, affinity)
            .await?;
        debug_assert!(items.iter().all(|item| item.post.is_video()));
        Ok(items)
    }

    pub fn compose_all_with(
        &self,
        organic: Vec<Post>,
        sponsored: Vec<Post>,
        viewer: Viewer,
    ) -> Result<Vec<FeedItem>> {
        let organic = videos_only(organic);
        let (seed, slots) = self.all_reels_seed(viewer, organic.len());
        self.composer
            .compose_with_slots(organic, videos_only(sponsored), seed, slots)
    }
}

fn videos_only(posts: Vec<Post>) -> Vec<Post> {
    let before = posts.len();
    let videos: Vec<Post> = posts.into_iter().filter(Post::is_video).collect();
    if videos.len() < before {
        warn!(
            dropped = before - videos.len(),
            "Non-video candidates dropped from reels"
        );
    }
    videos
}
