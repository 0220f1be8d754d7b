//! Splitting text into cacheable words and cursor queries.

use std::collections::HashSet;

use crate::cache::Query;

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Unique words of at least `min_len` characters, in first-seen order.
pub fn words(text: &str, min_len: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !is_word_char(c))
        .filter(|run| run.chars().count() >= min_len.max(1))
        .filter(|run| seen.insert(*run))
        .map(str::to_owned)
        .collect()
}

/// Derive a query from the text left of the cursor.
///
/// `word` is the trailing run of word characters; `sym` is the trailing run of
/// non-whitespace characters, so `self.val` yields word `val` and sym `self.val`.
pub fn cursor_query(line_before: &str) -> Query {
    Query::new(trailing(line_before, is_word_char), trailing(line_before, |c| !c.is_whitespace()))
}

fn trailing(text: &str, keep: impl Fn(char) -> bool) -> &str {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| keep(*c))
        .last()
        .map_or(text.len(), |(i, _)| i);
    &text[start..]
}
