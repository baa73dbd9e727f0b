use crate::error::Result;
use crate::models::{CompositionSeed, FeedItem, MediaFilter, Post};
use crate::services::{AffinityProfile, BusinessEligibilityResolver};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Number of sponsored slots a page of `page_size` can carry at `cadence`.
pub fn slot_budget(page_size: usize, cadence: usize) -> usize {
    page_size / (cadence.max(1) + 1)
}

/// Splice sponsored posts into the organic sequence.
///
/// After every `cadence` organic items the next unused sponsored post is
/// inserted. If organic runs out first, leftover sponsored posts fill the
/// remaining room. Output never exceeds `page_size` and no post id appears
/// twice.
pub fn interleave(
    organic: Vec<Post>,
    sponsored: Vec<Post>,
    page_size: usize,
    cadence: usize,
) -> Vec<FeedItem> {
    let cadence = cadence.max(1);
    let mut items = Vec::with_capacity(page_size.min(organic.len() + sponsored.len()));
    let mut emitted: HashSet<_> = HashSet::new();
    let mut sponsored = sponsored.into_iter();
    let mut since_last_slot = 0;

    for post in organic {
        if items.len() >= page_size {
            break;
        }
        if !emitted.insert(post.id) {
            continue;
        }
        items.push(FeedItem::organic(post));
        since_last_slot += 1;

        if since_last_slot == cadence && items.len() < page_size {
            since_last_slot = 0;
            if let Some(ad) = sponsored.by_ref().find(|ad| !emitted.contains(&ad.id)) {
                emitted.insert(ad.id);
                items.push(FeedItem::sponsored(ad));
            }
        }
    }

    for ad in sponsored {
        if items.len() >= page_size {
            break;
        }
        if emitted.insert(ad.id) {
            items.push(FeedItem::sponsored(ad));
        }
    }

    items
}

/// Feed Composer - 自然內容與商業內容混排
pub struct FeedComposer {
    resolver: Arc<BusinessEligibilityResolver>,
    cadence: usize,
    media_filter: MediaFilter,
}

impl FeedComposer {
    pub fn new(resolver: Arc<BusinessEligibilityResolver>, cadence: usize) -> Self {
        Self {
            resolver,
            cadence: cadence.max(1),
            media_filter: MediaFilter::Any,
        }
    }

    pub fn with_media_filter(mut self, media_filter: MediaFilter) -> Self {
        self.media_filter = media_filter;
        self
    }

    pub fn cadence(&self) -> usize {
        self.cadence
    }

    pub fn media_filter(&self) -> MediaFilter {
        self.media_filter
    }

    pub fn slot_budget(&self, page_size: usize) -> usize {
        slot_budget(page_size, self.cadence)
    }

    /// Fetch sponsored posts for this page and interleave them.
    pub async fn compose(
        &self,
        organic: Vec<Post>,
        seed: CompositionSeed,
        affinity: &AffinityProfile,
    ) -> Result<Vec<FeedItem>> {
        let slots = self.slot_budget(seed.page_size);
        self.compose_slots(organic, seed, slots, affinity).await
    }

    /// As [`compose`](Self::compose) with a caller-computed slot budget.
    pub async fn compose_slots(
        &self,
        organic: Vec<Post>,
        seed: CompositionSeed,
        slots: usize,
        affinity: &AffinityProfile,
    ) -> Result<Vec<FeedItem>> {
        validate_candidates(&organic)?;

        let sponsored = self
            .resolver
            .select_sponsored(&seed, slots, self.media_filter, affinity)
            .await;

        Ok(self.assemble(organic, sponsored, seed, slots))
    }

    /// Interleave with an already resolved sponsored set.
    pub fn compose_with(
        &self,
        organic: Vec<Post>,
        sponsored: Vec<Post>,
        seed: CompositionSeed,
    ) -> Result<Vec<FeedItem>> {
        let slots = self.slot_budget(seed.page_size);
        self.compose_with_slots(organic, sponsored, seed, slots)
    }

    pub fn compose_with_slots(
        &self,
        organic: Vec<Post>,
        sponsored: Vec<Post>,
        seed: CompositionSeed,
        slots: usize,
    ) -> Result<Vec<FeedItem>> {
        validate_candidates(&organic)?;
        Ok(self.assemble(organic, sponsored, seed, slots))
    }

    fn assemble(
        &self,
        organic: Vec<Post>,
        mut sponsored: Vec<Post>,
        seed: CompositionSeed,
        slots: usize,
    ) -> Vec<FeedItem> {
        sponsored.truncate(slots);

        let items = interleave(organic, sponsored, seed.page_size, self.cadence);
        info!(
            page = seed.page,
            page_size = seed.page_size,
            slot_budget = slots,
            items = items.len(),
            sponsored = items.iter().filter(|i| i.is_sponsored).count(),
            "Page composed"
        );
        items
    }
}

pub(crate) fn validate_candidates(posts: &[Post]) -> Result<()> {
    posts.iter().try_for_each(Post::validate)
}
