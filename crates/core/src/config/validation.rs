//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{CacheConfig, MatchOptions};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl MatchOptions {
    /// Validate match options.
    ///
    /// Also checked by every non-clearing select, so options built by hand
    /// are held to the same rules as loaded ones.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_results` is 0
    /// - `fuzzy_cutoff` is not a finite number within 0.0..=1.0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_results == 0 {
            return Err(ConfigError::Invalid {
                field: "match_options.max_results".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !self.fuzzy_cutoff.is_finite() || !(0.0..=1.0).contains(&self.fuzzy_cutoff) {
            return Err(ConfigError::Invalid {
                field: "match_options.fuzzy_cutoff".into(),
                reason: "must be between 0.0 and 1.0".into(),
            });
        }

        Ok(())
    }
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - the match options are invalid
    /// - `min_word_len` is 0
    /// - `deadline_ms` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.match_options.validate()?;

        if self.match_options.exact_matches == 0 {
            tracing::warn!(
                look_ahead = self.match_options.look_ahead,
                "exact_matches is 0; every stored word is a candidate for every select"
            );
        }

        if self.min_word_len == 0 {
            return Err(ConfigError::Invalid { field: "min_word_len".into(), reason: "must be greater than 0".into() });
        }

        if self.deadline_ms == 0 {
            return Err(ConfigError::Invalid { field: "deadline_ms".into(), reason: "must be at least 1ms".into() });
        }

        Ok(())
    }
}
