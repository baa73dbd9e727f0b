use crate::config::CompositionConfig;
use crate::models::{FeedCandidate, Post, SearchHistoryEntry, Viewer};
use crate::sources::SearchHistorySource;
use crate::utils::{dedupe_by_id, exponential_decay, tokenize, with_deadline};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Term weights built from a viewer's recent searches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffinityProfile {
    term_weights: HashMap<String, f32>,
}

impl AffinityProfile {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Each query contributes its decayed weight to every distinct term it contains.
    /// Repeated searches for the same term accumulate.
    pub fn from_history(
        entries: &[SearchHistoryEntry],
        now: DateTime<Utc>,
        half_life_hours: f32,
    ) -> Self {
        let mut term_weights: HashMap<String, f32> = HashMap::new();

        for entry in entries {
            let age_hours = (now - entry.searched_at).num_seconds() as f32 / 3600.0;
            let weight = exponential_decay(age_hours, half_life_hours);

            let mut terms: Vec<String> = tokenize(&entry.query).collect();
            terms.sort_unstable();
            terms.dedup();
            for term in terms {
                *term_weights.entry(term).or_insert(0.0) += weight;
            }
        }

        Self { term_weights }
    }

    pub fn is_empty(&self) -> bool {
        self.term_weights.is_empty()
    }

    pub fn weight(&self, term: &str) -> f32 {
        self.term_weights.get(term).copied().unwrap_or(0.0)
    }

    /// Terms by descending weight, ties alphabetical.
    pub fn keywords(&self) -> Vec<String> {
        let mut terms: Vec<(&String, f32)> =
            self.term_weights.iter().map(|(t, w)| (t, *w)).collect();
        terms.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        terms.into_iter().map(|(t, _)| t.clone()).collect()
    }

    /// Sum of weights for query terms that appear as whole tokens in the post.
    pub fn score(&self, post: &Post) -> f32 {
        post.tokens().iter().map(|token| self.weight(token)).sum()
    }

    /// Score and stable-sort by descending affinity. Ties keep input order,
    /// which upstream already sorted newest first.
    pub fn rank(&self, posts: Vec<Post>) -> Vec<FeedCandidate> {
        let mut ranked: Vec<FeedCandidate> = dedupe_by_id(posts)
            .into_iter()
            .map(|post| FeedCandidate {
                affinity_score: self.score(&post),
                post,
            })
            .collect();

        ranked.sort_by(|a, b| b.affinity_score.total_cmp(&a.affinity_score));
        ranked
    }

    /// Reorder `posts`; an empty profile hands them back untouched.
    pub fn apply(&self, posts: Vec<Post>) -> Vec<Post> {
        if self.is_empty() {
            return posts;
        }
        self.rank(posts).into_iter().map(|c| c.post).collect()
    }
}

/// Re-ranks organic candidates by the viewer's search affinity.
pub struct UserPostPrioritizer {
    search_history: Arc<dyn SearchHistorySource>,
    history_window: usize,
    half_life_hours: f32,
    timeout: Duration,
}

impl UserPostPrioritizer {
    pub fn new(search_history: Arc<dyn SearchHistorySource>, config: &CompositionConfig) -> Self {
        Self {
            search_history,
            history_window: config.search_history_window,
            half_life_hours: config.affinity_half_life_hours,
            timeout: config.affinity_timeout(),
        }
    }

    /// Load the viewer's affinity profile. Anonymous viewers, empty history and
    /// any failure of the history source all yield an empty profile.
    pub async fn affinity_profile(&self, viewer: &Viewer) -> AffinityProfile {
        self.affinity_profile_at(viewer, Utc::now()).await
    }

    pub async fn affinity_profile_at(&self, viewer: &Viewer, now: DateTime<Utc>) -> AffinityProfile {
        let Some(user_id) = viewer.user_id() else {
            return AffinityProfile::empty();
        };

        let fetch = self
            .search_history
            .recent_queries(user_id, self.history_window);
        match with_deadline("search_history", self.timeout, fetch).await {
            Ok(mut entries) => {
                entries.truncate(self.history_window);
                let profile = AffinityProfile::from_history(&entries, now, self.half_life_hours);
                debug!(
                    user_id = %user_id,
                    queries = entries.len(),
                    terms = profile.term_weights.len(),
                    "Affinity profile built"
                );
                profile
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Search history unavailable, keeping organic order"
                );
                AffinityProfile::empty()
            }
        }
    }

    /// Same posts, reordered; never drops or adds items.
    pub async fn prioritize(&self, candidates: Vec<Post>, viewer: &Viewer) -> Vec<Post> {
        if candidates.is_empty() {
            return candidates;
        }
        self.affinity_profile(viewer).await.apply(candidates)
    }
}
