//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (WORDCACHE_*)
//! 2. TOML config file (if WORDCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Knobs consumed by both query tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOptions {
    /// Leading characters of the query a candidate must share literally.
    #[serde(default = "default_exact_matches")]
    pub exact_matches: usize,

    /// Highest dissimilarity score (0 = identical, 1 = disjoint) a primary-tier candidate may have.
    #[serde(default = "default_fuzzy_cutoff")]
    pub fuzzy_cutoff: f64,

    /// Extra candidate characters the scorer looks at past the query length.
    #[serde(default = "default_look_ahead")]
    pub look_ahead: usize,

    /// Row cap for a single select.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_exact_matches() -> usize {
    2
}

fn default_fuzzy_cutoff() -> f64 {
    0.5
}

fn default_look_ahead() -> usize {
    2
}

fn default_max_results() -> usize {
    33
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            exact_matches: default_exact_matches(),
            fuzzy_cutoff: default_fuzzy_cutoff(),
            look_ahead: default_look_ahead(),
            max_results: default_max_results(),
        }
    }
}

impl MatchOptions {
    /// SQL `LIMIT` for a select; `limitless` lifts the cap entirely.
    pub fn limit(&self, limitless: bool) -> i64 {
        if limitless { i64::MAX } else { i64::try_from(self.max_results).unwrap_or(i64::MAX) }
    }
}

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (WORDCACHE_*)
/// 2. TOML config file (if WORDCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Scoring and capping options passed to every select.
    ///
    /// Nested keys are set via WORDCACHE_MATCH_OPTIONS__* environment variables.
    #[serde(default)]
    pub match_options: MatchOptions,

    /// Shortest token the tokenizer keeps when ingesting text.
    ///
    /// Set via WORDCACHE_MIN_WORD_LEN environment variable.
    #[serde(default = "default_min_word_len")]
    pub min_word_len: usize,

    /// How long a select may stay pending before the caller abandons it.
    ///
    /// Set via WORDCACHE_DEADLINE_MS environment variable.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_min_word_len() -> usize {
    2
}

fn default_deadline_ms() -> u64 {
    250
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            match_options: MatchOptions::default(),
            min_word_len: default_min_word_len(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl CacheConfig {
    /// Select deadline as Duration for use with tokio timers.
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `WORDCACHE_`
    /// 2. TOML file from `WORDCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("WORDCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("WORDCACHE_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
