pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use error::{CompositionError, Result};
pub use pipeline::CompositionService;
pub use services::{BusinessEligibilityResolver, FeedComposer, ReelComposer, UserPostPrioritizer};
