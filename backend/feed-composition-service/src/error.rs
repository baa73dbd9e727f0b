use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, CompositionError>;

#[derive(Debug, Error)]
pub enum CompositionError {
    /// An upstream collaborator handed over a post that breaks the candidate contract.
    #[error("Malformed candidate {post_id}: {reason}")]
    MalformedCandidate { post_id: Uuid, reason: String },

    #[error("Dependency {dependency} unavailable: {reason}")]
    DependencyUnavailable {
        dependency: &'static str,
        reason: String,
    },

    #[error("Dependency {dependency} exceeded its deadline of {elapsed:?}")]
    DeadlineExceeded {
        dependency: &'static str,
        elapsed: Duration,
    },

    #[error("Candidate source failed: {0}")]
    CandidateSource(String),
}
