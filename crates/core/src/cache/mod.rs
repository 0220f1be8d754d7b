//! SQLite-backed word cache.
//!
//! This module provides an in-memory store of unique words using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - A single owner thread for the connection, fed through a FIFO queue
//! - Two-tier fuzzy prefix queries scored inside SQL
//! - Out-of-band interrupts that abort a query already running

mod executor;
pub mod fuzzy;
mod interrupt;
pub mod migrations;
pub mod query;
pub mod words;

pub use crate::Error;

pub use query::{Match, Matches, Query};
pub use words::WordCache;
