//! Core types and shared functionality for wordcache.
//!
//! This crate provides:
//! - Word cache implementation with an in-memory SQLite backend
//! - Tokenizing helpers for feeding and querying the cache
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod tokens;

pub use cache::{Match, Matches, Query, WordCache};
pub use config::{CacheConfig, MatchOptions};
pub use error::Error;
