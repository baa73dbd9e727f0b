// Utility functions for feed-composition-service

use crate::error::{CompositionError, Result};
use crate::models::Post;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Compute exponential decay for time-based scoring
pub fn exponential_decay(age_hours: f32, half_life_hours: f32) -> f32 {
    (-age_hours.max(0.0) / half_life_hours * std::f32::consts::LN_2).exp()
}

/// Split text into lowercase whole tokens. `#` and `@` prefixes and punctuation are separators.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Keep the first occurrence of every post id, preserving order.
pub fn dedupe_by_id(posts: Vec<Post>) -> Vec<Post> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts.into_iter().filter(|p| seen.insert(p.id)).collect()
}

/// Run a fallible dependency call under a deadline, mapping both failure modes
/// to recoverable composition errors.
pub async fn with_deadline<F, T>(
    dependency: &'static str,
    duration: Duration,
    future: F,
) -> Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CompositionError::DependencyUnavailable {
            dependency,
            reason: format!("{:#}", e),
        }),
        Err(_) => Err(CompositionError::DeadlineExceeded {
            dependency,
            elapsed: duration,
        }),
    }
}
