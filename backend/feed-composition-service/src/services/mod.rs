pub mod composer;
pub mod eligibility;
pub mod prioritizer;
pub mod reels;

pub use composer::FeedComposer;
pub use eligibility::BusinessEligibilityResolver;
pub use prioritizer::{AffinityProfile, UserPostPrioritizer};
pub use reels::ReelComposer;
