//! Fuzzy scoring exposed to SQL.
//!
//! The select queries rank candidates with `x_dissimilarity`, a scalar
//! function registered on the connection before any query is prepared.

use std::collections::HashMap;

use tokio_rusqlite::rusqlite::{self, functions::FunctionFlags};

/// Name of the scoring function as seen from SQL.
pub(crate) const DISSIMILARITY_FN: &str = "x_dissimilarity";

/// Escape character used in every `LIKE ... ESCAPE` clause.
pub(crate) const LIKE_ESCAPE: char = '!';

/// Multiset character dissimilarity between `lhs` and the head of `rhs`.
///
/// Only the first `len(lhs) + look_ahead` characters of `rhs` are compared.
/// Both sides are lower-cased. Returns 0.0 for identical multisets and 1.0
/// when nothing is shared; an empty `lhs` matches everything.
pub fn dissimilarity(lhs: &str, rhs: &str, look_ahead: usize) -> f64 {
    let lhs: Vec<char> = lhs.chars().flat_map(char::to_lowercase).collect();
    if lhs.is_empty() {
        return 0.0;
    }

    let window: Vec<char> = rhs.chars().flat_map(char::to_lowercase).take(lhs.len() + look_ahead).collect();

    let mut balance: HashMap<char, i64> = HashMap::new();
    for c in &lhs {
        *balance.entry(*c).or_default() += 1;
    }
    for c in &window {
        *balance.entry(*c).or_default() -= 1;
    }

    let missing: i64 = balance.values().filter(|n| **n > 0).sum();
    let extra: i64 = balance.values().filter(|n| **n < 0).map(|n| -n).sum();

    missing.max(extra) as f64 / lhs.len().max(window.len()) as f64
}

/// Build a `LIKE` prefix pattern from the first `exact` characters of `word`.
///
/// `%`, `_` and the escape character itself are escaped with [`LIKE_ESCAPE`].
pub fn like_prefix(word: &str, exact: usize) -> String {
    let mut pattern = String::with_capacity(word.len() + 1);
    for c in word.chars().take(exact) {
        if matches!(c, '%' | '_') || c == LIKE_ESCAPE {
            pattern.push(LIKE_ESCAPE);
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Register the scoring functions on `conn`.
pub fn register(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        DISSIMILARITY_FN,
        3,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let lhs: String = ctx.get(0)?;
            let rhs: String = ctx.get(1)?;
            let look_ahead: i64 = ctx.get(2)?;
            Ok(dissimilarity(&lhs, &rhs, usize::try_from(look_ahead).unwrap_or(0)))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_is_zero() {
        assert_eq!(dissimilarity("foo", "foo", 0), 0.0);
        assert_eq!(dissimilarity("Foo", "fOO", 3), 0.0);
    }

    #[test]
    fn test_disjoint_is_one() {
        assert_eq!(dissimilarity("xy", "bar", 2), 1.0);
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert_eq!(dissimilarity("", "anything", 5), 0.0);
    }

    #[test]
    fn test_look_ahead_widens_window() {
        assert_eq!(dissimilarity("fo", "foobar", 0), 0.0);
        let widened = dissimilarity("fo", "foobar", 2);
        assert!((widened - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_transposition_is_free() {
        assert_eq!(dissimilarity("of", "foo", 0), 0.0);
    }

    #[test]
    fn test_short_candidate_counts_missing_chars() {
        // "abcd" vs "ab": two query chars absent from the window.
        let score = dissimilarity("abcd", "ab", 2);
        assert!((score - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_like_prefix() {
        assert_eq!(like_prefix("foobar", 2), "fo%");
        assert_eq!(like_prefix("fo", 5), "fo%");
        assert_eq!(like_prefix("anything", 0), "%");
        assert_eq!(like_prefix("a_%!b", 4), "a!_!%!!%");
    }

    #[test]
    fn test_like_prefix_counts_chars_not_bytes() {
        assert_eq!(like_prefix("ñandú", 2), "ña%");
    }

    #[test]
    fn test_registered_function_is_callable() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        register(&conn).unwrap();
        let score: f64 = conn
            .query_row("SELECT x_dissimilarity('xy', 'bar', 2)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(score, 1.0);
    }
}
