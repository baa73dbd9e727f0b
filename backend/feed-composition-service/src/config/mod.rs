use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}: {value}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Failed to read composition settings: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid composition settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub redis: RedisConfig,
    pub composition: CompositionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Tunables for the composition engine.
///
/// Read with `envy` from `COMPOSITION_*` variables; anything unset keeps its default.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositionConfig {
    /// Organic items between sponsored slots in the home feed.
    #[serde(default = "default_feed_cadence")]
    pub feed_cadence: usize,
    /// Organic items between sponsored slots in reels.
    #[serde(default = "default_reel_cadence")]
    pub reel_cadence: usize,
    #[serde(default = "default_search_history_window")]
    pub search_history_window: usize,
    #[serde(default = "default_affinity_half_life_hours")]
    pub affinity_half_life_hours: f32,
    #[serde(default = "default_eligibility_window_multiplier")]
    pub eligibility_window_multiplier: usize,
    /// Upper bound on turns a single business gets per round-robin round.
    #[serde(default = "default_max_business_weight")]
    pub max_business_weight: u32,
    #[serde(default = "default_inventory_fetch_limit")]
    pub inventory_fetch_limit: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default)]
    pub anonymous_bucket: u32,
    #[serde(default = "default_affinity_timeout_ms")]
    pub affinity_timeout_ms: u64,
    #[serde(default = "default_eligibility_timeout_ms")]
    pub eligibility_timeout_ms: u64,
}

fn default_feed_cadence() -> usize {
    5
}

fn default_reel_cadence() -> usize {
    3
}

fn default_search_history_window() -> usize {
    20
}

fn default_affinity_half_life_hours() -> f32 {
    72.0
}

fn default_eligibility_window_multiplier() -> usize {
    3
}

fn default_max_business_weight() -> u32 {
    3
}

fn default_inventory_fetch_limit() -> usize {
    200
}

fn default_page_size() -> usize {
    20
}

fn default_max_page_size() -> usize {
    50
}

fn default_affinity_timeout_ms() -> u64 {
    150
}

fn default_eligibility_timeout_ms() -> u64 {
    200
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            feed_cadence: default_feed_cadence(),
            reel_cadence: default_reel_cadence(),
            search_history_window: default_search_history_window(),
            affinity_half_life_hours: default_affinity_half_life_hours(),
            eligibility_window_multiplier: default_eligibility_window_multiplier(),
            max_business_weight: default_max_business_weight(),
            inventory_fetch_limit: default_inventory_fetch_limit(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            anonymous_bucket: 0,
            affinity_timeout_ms: default_affinity_timeout_ms(),
            eligibility_timeout_ms: default_eligibility_timeout_ms(),
        }
    }
}

impl CompositionConfig {
    pub fn affinity_timeout(&self) -> Duration {
        Duration::from_millis(self.affinity_timeout_ms)
    }

    pub fn eligibility_timeout(&self) -> Duration {
        Duration::from_millis(self.eligibility_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feed_cadence == 0 || self.reel_cadence == 0 {
            return Err(ConfigError::Invalid(
                "cadence must be at least 1 organic item".to_string(),
            ));
        }
        if self.search_history_window == 0 {
            return Err(ConfigError::Invalid(
                "search_history_window must be positive".to_string(),
            ));
        }
        if self.eligibility_window_multiplier == 0 || self.max_business_weight == 0 {
            return Err(ConfigError::Invalid(
                "eligibility window multiplier and business weight must be positive".to_string(),
            ));
        }
        if !(self.affinity_half_life_hours > 0.0) {
            return Err(ConfigError::Invalid(
                "affinity_half_life_hours must be positive".to_string(),
            ));
        }
        if self.max_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "default_page_size ({}) must be within 1..={}",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "plain".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            "plain" | "text" => LogFormat::Plain,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "LOG_FORMAT",
                    expected: "log format (plain|json)",
                    value: other.to_string(),
                })
            }
        };

        let composition: CompositionConfig = envy::prefixed("COMPOSITION_").from_env()?;
        composition.validate()?;

        Ok(Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "feed-composition-service".to_string()),
                log_format,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            composition,
        })
    }
}
