mod rotation;

use crate::config::CompositionConfig;
use crate::error::Result;
use crate::models::{CompositionSeed, MediaFilter, Post, Visibility};
use crate::services::AffinityProfile;
use crate::sources::{AccountDirectory, SponsoredInventory};
use crate::utils::{dedupe_by_id, with_deadline};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use rotation::{eligibility_window, pick_from_window, weighted_round_robin};

/// Business Eligibility Resolver - 選出本頁可投放的商業貼文
///
/// Tier and expiry are looked up on every call, so a subscription that lapses
/// between two requests drops out immediately. Selection is a pure function of
/// the inventory and the composition seed. The viewer's affinity keywords only
/// steer the inventory's priority order.
pub struct BusinessEligibilityResolver {
    inventory: Arc<dyn SponsoredInventory>,
    accounts: Arc<dyn AccountDirectory>,
    window_multiplier: usize,
    max_business_weight: u32,
    fetch_limit: usize,
    timeout: Duration,
}

impl BusinessEligibilityResolver {
    pub fn new(
        inventory: Arc<dyn SponsoredInventory>,
        accounts: Arc<dyn AccountDirectory>,
        config: &CompositionConfig,
    ) -> Self {
        Self {
            inventory,
            accounts,
            window_multiplier: config.eligibility_window_multiplier,
            max_business_weight: config.max_business_weight,
            fetch_limit: config.inventory_fetch_limit,
            timeout: config.eligibility_timeout(),
        }
    }

    /// Up to `slot_count` sponsored posts for the page described by `seed`.
    /// Never fails: dependency errors produce an empty selection.
    pub async fn select_sponsored(
        &self,
        seed: &CompositionSeed,
        slot_count: usize,
        filter: MediaFilter,
        affinity: &AffinityProfile,
    ) -> Vec<Post> {
        self.select_sponsored_at(seed, slot_count, filter, affinity, Utc::now())
            .await
    }

    pub async fn select_sponsored_at(
        &self,
        seed: &CompositionSeed,
        slot_count: usize,
        filter: MediaFilter,
        affinity: &AffinityProfile,
        now: DateTime<Utc>,
    ) -> Vec<Post> {
        if slot_count == 0 {
            return Vec::new();
        }

        match self
            .try_select(seed, slot_count, filter, affinity.keywords(), now)
            .await
        {
            Ok(selected) => {
                debug!(
                    page = seed.page,
                    slot_count,
                    selected = selected.len(),
                    "Sponsored posts selected"
                );
                selected
            }
            Err(e) => {
                warn!(
                    page = seed.page,
                    error = %e,
                    "Sponsored selection failed, serving organic only"
                );
                Vec::new()
            }
        }
    }

    async fn try_select(
        &self,
        seed: &CompositionSeed,
        slot_count: usize,
        filter: MediaFilter,
        keywords: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let window_size = slot_count.saturating_mul(self.window_multiplier);
        let limit = self.fetch_limit.max(window_size);

        let inventory = with_deadline(
            "sponsored_inventory",
            self.timeout,
            self.inventory.business_posts(seed.viewer, filter, keywords, limit),
        )
        .await?;

        let candidates: Vec<Post> = dedupe_by_id(inventory)
            .into_iter()
            .filter(|post| post.visibility == Visibility::Public && filter.matches(post.media_type))
            .filter(|post| match post.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed sponsored post");
                    false
                }
            })
            .collect();

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let active = self.active_businesses(&candidates, now).await?;
        let eligible: Vec<Post> = candidates
            .into_iter()
            .filter(|post| active.contains(&post.author_id))
            .collect();

        let sequence = weighted_round_robin(eligible, self.max_business_weight);
        let window = eligibility_window(&sequence, seed.page, slot_count, self.window_multiplier);
        Ok(pick_from_window(window, seed, slot_count))
    }

    /// Authors among `posts` whose business subscription is active at `now`.
    async fn active_businesses(&self, posts: &[Post], now: DateTime<Utc>) -> Result<HashSet<Uuid>> {
        let mut authors: Vec<Uuid> = Vec::new();
        let mut seen = HashSet::new();
        for post in posts {
            if seen.insert(post.author_id) {
                authors.push(post.author_id);
            }
        }

        let standings = with_deadline(
            "account_directory",
            self.timeout,
            self.accounts.standings(authors),
        )
        .await?;

        Ok(standings
            .into_iter()
            .filter(|(_, standing)| standing.is_active_business(now))
            .map(|(author, _)| author)
            .collect())
    }
}
