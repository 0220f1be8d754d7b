//! Query inputs and ranked results.

use serde::{Deserialize, Serialize};

/// What a select looks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Primary prefix, scored by both tiers.
    pub word: String,
    /// Secondary signature of the same token, scored by the primary tier only.
    pub sym: String,
    /// Ignore `max_results` and return every qualifying row.
    #[serde(default)]
    pub limitless: bool,
}

impl Query {
    pub fn new(word: impl Into<String>, sym: impl Into<String>) -> Self {
        Self { word: word.into(), sym: sym.into(), limitless: false }
    }

    pub fn limitless(mut self) -> Self {
        self.limitless = true;
        self
    }
}

/// A candidate word and how its position should be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum Match {
    /// Found by the primary tier; the result order is already the ranking.
    Primary { word: String },
    /// Found by the word-only fallback; callers re-rank by `sort_key`.
    Backup { word: String, sort_key: String },
}

impl Match {
    pub fn word(&self) -> &str {
        match self {
            Match::Primary { word } | Match::Backup { word, .. } => word,
        }
    }

    pub fn sort_key(&self) -> Option<&str> {
        match self {
            Match::Primary { .. } => None,
            Match::Backup { sort_key, .. } => Some(sort_key),
        }
    }

    pub fn into_word(self) -> String {
        match self {
            Match::Primary { word } | Match::Backup { word, .. } => word,
        }
    }
}

/// One-shot sequence of select results.
#[derive(Debug, Default)]
pub struct Matches {
    inner: std::vec::IntoIter<Match>,
}

impl Matches {
    pub(crate) fn new(rows: Vec<Match>) -> Self {
        Self { inner: rows.into_iter() }
    }
}

impl Iterator for Matches {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Matches {}
