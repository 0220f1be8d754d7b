//! The word cache façade.
//!
//! Turns `insert`/`select` calls into units of work on the owner `Executor` and
//! drives the interrupt protocol for selects:
//!
//! 1. a queued interrupt unit clears whatever a previous select left running,
//! 2. the select unit runs the primary tier, then the backup tier if the
//!    primary tier came back empty,
//! 3. if the caller gives up first, a forced interrupt bypasses the queue to
//!    abort the running query before the cancellation is reported, and the
//!    select unit skips any statement it has not started yet.

use tokio_rusqlite::rusqlite::{self, named_params};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::executor::Executor;
use super::fuzzy::like_prefix;
use super::interrupt::{InterruptOnDrop, Interrupter};
use super::query::{Match, Matches, Query};
use crate::Error;
use crate::config::MatchOptions;

const INSERT_WORD: &str = include_str!("../../sql/insert_word.sql");
const DELETE_WORDS: &str = include_str!("../../sql/delete_words.sql");
const COUNT_WORDS: &str = include_str!("../../sql/count_words.sql");
const SELECT_WORDS: &str = include_str!("../../sql/select_words.sql");
const SELECT_BACKUP_WORDS: &str = include_str!("../../sql/select_backup_words.sql");

/// In-memory store of unique words with fuzzy prefix lookup.
///
/// Cloning is cheap; clones share one connection and one interrupt mutex.
#[derive(Clone, Debug)]
pub struct WordCache {
    exec: Executor,
    interrupter: Interrupter,
}

/// Bound parameters for both tiers, owned so they can cross to the owner thread.
#[derive(Debug)]
struct SelectParams {
    word: String,
    sym: String,
    like_word: String,
    like_sym: String,
    look_ahead: i64,
    cut_off: f64,
    limit: i64,
}

impl SelectParams {
    fn new(options: &MatchOptions, query: &Query) -> Self {
        Self {
            word: query.word.clone(),
            sym: query.sym.clone(),
            like_word: like_prefix(&query.word, options.exact_matches),
            like_sym: like_prefix(&query.sym, options.exact_matches),
            look_ahead: i64::try_from(options.look_ahead).unwrap_or(i64::MAX),
            cut_off: options.fuzzy_cutoff,
            limit: options.limit(query.limitless),
        }
    }
}

impl WordCache {
    /// Open an empty cache backed by a fresh in-memory connection.
    pub async fn open() -> Result<Self, Error> {
        let exec = Executor::open_in_memory().await?;
        let interrupter = Interrupter::new(exec.interrupt_handle().await?);
        tracing::info!("word cache ready");
        Ok(Self { exec, interrupter })
    }

    /// Commit `words` in one transaction. Words already present are kept as they are.
    ///
    /// Holds the interrupt mutex throughout, so a write is never aborted
    /// halfway and cannot be cancelled once submitted.
    pub async fn insert<I, W>(&self, words: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = W>,
        W: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        let interrupter = self.interrupter.clone();

        let added = self
            .exec
            .submit(move |conn| {
                let _guard = interrupter.hold();
                let tx = conn.transaction()?;
                let mut added = 0;
                {
                    let mut stmt = tx.prepare_cached(INSERT_WORD)?;
                    for word in &words {
                        added += stmt.execute(named_params! { ":word": word })?;
                    }
                }
                tx.commit()?;
                Ok(added)
            })
            .await?;

        debug!(added, "inserted words");
        Ok(())
    }

    /// Look up candidates for `query`, or wipe the store when `clear` is set.
    ///
    /// Engine failures while querying (an interrupt, a locked table) yield an
    /// empty result rather than an error. Dropping the returned future before
    /// it resolves forces an interrupt on the running query.
    pub async fn select(&self, clear: bool, options: &MatchOptions, query: &Query) -> Result<Matches, Error> {
        self.select_until(clear, options, query, &CancellationToken::new())
            .await
    }

    /// [`select`](Self::select) that gives up once `cancel` fires.
    ///
    /// On cancellation the running query is interrupted out of band and
    /// `Error::Cancelled` is returned after the interrupt has been delivered.
    ///
    /// Options that fail [`MatchOptions::validate`] are rejected with
    /// `Error::InvalidInput` unless `clear` is set.
    pub async fn select_until(
        &self, clear: bool, options: &MatchOptions, query: &Query, cancel: &CancellationToken,
    ) -> Result<Matches, Error> {
        if !clear {
            options
                .validate()
                .map_err(|e| Error::InvalidInput(e.to_string()))?;
        }

        let abandoned = cancel.child_token();
        let guard = InterruptOnDrop::arm(&self.interrupter, &abandoned);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            rows = self.run_select(clear, options, query, &abandoned) => Some(rows),
        };

        match outcome {
            Some(rows) => {
                guard.disarm();
                Ok(Matches::new(rows?))
            }
            None => {
                debug!(word = %query.word, "select cancelled");
                self.interrupter.force().await?;
                guard.disarm();
                Err(Error::Cancelled)
            }
        }
    }

    /// Number of stored words.
    pub async fn len(&self) -> Result<usize, Error> {
        let count: i64 = self
            .exec
            .submit(|conn| Ok(conn.query_row(COUNT_WORDS, [], |row| row.get(0))?))
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }

    async fn run_select(
        &self, clear: bool, options: &MatchOptions, query: &Query, abandoned: &CancellationToken,
    ) -> Result<Vec<Match>, Error> {
        let interrupter = self.interrupter.clone();
        self.exec
            .submit(move |_conn| {
                interrupter.interrupt();
                Ok(())
            })
            .await?;

        if clear {
            let interrupter = self.interrupter.clone();
            return self
                .exec
                .submit(move |conn| {
                    let _guard = interrupter.hold();
                    let tx = conn.transaction()?;
                    let deleted = tx.execute(DELETE_WORDS, [])?;
                    tx.commit()?;
                    debug!(deleted, "cleared words");
                    Ok(Vec::new())
                })
                .await;
        }

        let params = SelectParams::new(options, query);
        let abandoned = abandoned.clone();
        self.exec
            .submit(move |conn| match select_tiers(conn, &params, &abandoned) {
                Err(err) if err.is_operational() => {
                    debug!(%err, word = %params.word, "select aborted by engine");
                    Ok(Vec::new())
                }
                rows => rows,
            })
            .await
    }
}

/// Primary tier first; the backup tier only runs when the primary finds nothing.
///
/// A forced interrupt raised while no statement is active is lost, so
/// `abandoned` is checked before each tier starts.
fn select_tiers(
    conn: &mut rusqlite::Connection, params: &SelectParams, abandoned: &CancellationToken,
) -> Result<Vec<Match>, Error> {
    if abandoned.is_cancelled() {
        debug!(word = %params.word, "select abandoned before primary tier");
        return Ok(Vec::new());
    }

    let tx = conn.transaction()?;

    let primary = {
        let mut stmt = tx.prepare_cached(SELECT_WORDS)?;
        stmt.query_map(
            named_params! {
                ":word": params.word,
                ":sym": params.sym,
                ":like_word": params.like_word,
                ":like_sym": params.like_sym,
                ":look_ahead": params.look_ahead,
                ":cut_off": params.cut_off,
                ":limit": params.limit,
            },
            |row| Ok(Match::Primary { word: row.get(0)? }),
        )?
        .collect::<Result<Vec<_>, _>>()?
    };

    if !primary.is_empty() {
        tx.commit()?;
        return Ok(primary);
    }

    if abandoned.is_cancelled() {
        tx.commit()?;
        debug!(word = %params.word, "select abandoned before backup tier");
        return Ok(Vec::new());
    }

    let backup = {
        let mut stmt = tx.prepare_cached(SELECT_BACKUP_WORDS)?;
        stmt.query_map(
            named_params! {
                ":word": params.word,
                ":like_word": params.like_word,
                ":look_ahead": params.look_ahead,
                ":limit": params.limit,
            },
            |row| Ok(Match::Backup { word: row.get(0)?, sort_key: row.get(1)? }),
        )?
        .collect::<Result<Vec<_>, _>>()?
    };

    tx.commit()?;
    debug!(rows = backup.len(), word = %params.word, "primary tier empty, used backup tier");
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::cache::executor::tests::{enqueue, gate};
    use crate::cache::fuzzy::{DISSIMILARITY_FN, LIKE_ESCAPE};

    const SLOW_ROWS: usize = 40_000;

    fn options(exact_matches: usize, max_results: usize) -> MatchOptions {
        MatchOptions { exact_matches, fuzzy_cutoff: 0.5, look_ahead: 2, max_results }
    }

    fn words(matches: Matches) -> Vec<String> {
        matches.map(Match::into_word).collect()
    }

    /// A cache where a limitless select scores every row, plus how long one
    /// uninterrupted run of that select takes.
    async fn slow_cache() -> (WordCache, MatchOptions, Query, Duration) {
        let cache = WordCache::open().await.unwrap();
        cache.insert((0..SLOW_ROWS).map(|i| format!("word{i}"))).await.unwrap();

        let opts = MatchOptions { exact_matches: 0, fuzzy_cutoff: 1.0, look_ahead: 4, max_results: 10 };
        let query = Query::new("word1", "word1").limitless();

        let started = Instant::now();
        let found = cache.select(false, &opts, &query).await.unwrap();
        assert_eq!(found.len(), SLOW_ROWS);
        (cache, opts, query, started.elapsed())
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo"]).await.unwrap();
        cache.insert(["foo"]).await.unwrap();
        cache.insert(vec!["foo".to_string(), "foo".to_string()]).await.unwrap();

        assert_eq!(cache.len().await.unwrap(), 1);

        let found = cache
            .select(false, &options(2, 10), &Query::new("foo", "foo"))
            .await
            .unwrap();
        assert_eq!(words(found), vec!["foo"]);
    }

    #[tokio::test]
    async fn test_insert_empty_batch() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(Vec::<String>::new()).await.unwrap();
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_deletes_everything() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo", "bar", "baz"]).await.unwrap();

        let cleared = cache
            .select(true, &options(2, 10), &Query::new("foo", "foo"))
            .await
            .unwrap();
        assert_eq!(cleared.len(), 0);
        assert!(cache.is_empty().await.unwrap());

        let after = cache
            .select(false, &options(0, 10), &Query::new("", ""))
            .await
            .unwrap();
        assert_eq!(after.len(), 0);
    }

    #[tokio::test]
    async fn test_primary_tier_has_no_sort_key() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo", "bar"]).await.unwrap();

        let found: Vec<Match> = cache
            .select(false, &options(2, 10), &Query::new("fo", "fo"))
            .await
            .unwrap()
            .collect();
        assert_eq!(found, vec![Match::Primary { word: "foo".into() }]);
    }

    #[tokio::test]
    async fn test_primary_tier_matches_on_sym() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["self.value", "selection"]).await.unwrap();

        let found = cache
            .select(false, &options(5, 10), &Query::new("value", "self.v"))
            .await
            .unwrap();
        assert_eq!(words(found), vec!["self.value"]);
    }

    #[tokio::test]
    async fn test_backup_tier_carries_sort_key() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["Bar"]).await.unwrap();

        let found: Vec<Match> = cache
            .select(false, &options(0, 10), &Query::new("xy", "zz"))
            .await
            .unwrap()
            .collect();
        assert_eq!(found, vec![Match::Backup { word: "Bar".into(), sort_key: "bar".into() }]);
    }

    #[tokio::test]
    async fn test_primary_orders_by_score() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foobar", "foo", "fox"]).await.unwrap();

        let opts = MatchOptions { exact_matches: 2, fuzzy_cutoff: 1.0, look_ahead: 1, max_results: 10 };
        let found = cache.select(false, &opts, &Query::new("foo", "foo")).await.unwrap();
        assert_eq!(words(found), vec!["foo", "foobar", "fox"]);
    }

    #[tokio::test]
    async fn test_results_are_bounded() {
        let cache = WordCache::open().await.unwrap();
        cache.insert((0..50).map(|i| format!("item{i:02}"))).await.unwrap();

        let opts = MatchOptions { exact_matches: 2, fuzzy_cutoff: 1.0, look_ahead: 2, max_results: 10 };
        let capped = cache.select(false, &opts, &Query::new("it", "it")).await.unwrap();
        assert_eq!(capped.len(), 10);

        let unbounded = cache
            .select(false, &opts, &Query::new("it", "it").limitless())
            .await
            .unwrap();
        assert_eq!(unbounded.len(), 50);
    }

    #[tokio::test]
    async fn test_backup_tier_is_bounded() {
        let cache = WordCache::open().await.unwrap();
        cache.insert((0..20).map(|i| format!("w{i}"))).await.unwrap();

        let found = cache
            .select(false, &options(0, 5), &Query::new("qq", "qq"))
            .await
            .unwrap();
        assert_eq!(found.len(), 5);
        assert!(found.into_iter().all(|m| m.sort_key().is_some()));
    }

    #[tokio::test]
    async fn test_engine_failure_yields_empty() {
        let cache = WordCache::open().await.unwrap();
        cache
            .exec
            .submit(|conn| {
                conn.execute_batch("DROP TABLE words")?;
                Ok(())
            })
            .await
            .unwrap();

        let found = cache
            .select(false, &options(0, 10), &Query::new("any", "any"))
            .await
            .unwrap();
        assert_eq!(found.len(), 0);
    }

    #[tokio::test]
    async fn test_insert_failure_propagates() {
        let cache = WordCache::open().await.unwrap();
        cache
            .exec
            .submit(|conn| {
                conn.execute_batch("DROP TABLE words")?;
                Ok(())
            })
            .await
            .unwrap();

        let result = cache.insert(["foo"]).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo", "food"]).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = cache
            .select_until(false, &options(2, 10), &Query::new("fo", "fo"), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));

        let found = cache
            .select(false, &options(2, 10), &Query::new("fo", "fo"))
            .await
            .unwrap();
        assert_eq!(words(found), vec!["foo", "food"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_bypasses_busy_queue() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo", "food"]).await.unwrap();

        let (gate, release) = gate(&cache.exec).await;

        let cancel = CancellationToken::new();
        let pending = tokio::spawn({
            let cache = cache.clone();
            let cancel = cancel.clone();
            async move {
                cache
                    .select_until(false, &options(2, 10), &Query::new("fo", "fo"), &cancel)
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        // Resolves while the owner thread is still parked: the forced
        // interrupt never waits in the queue.
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));

        release.send(()).unwrap();
        gate.await.unwrap().unwrap();

        let found = cache
            .select(false, &options(2, 10), &Query::new("fo", "fo"))
            .await
            .unwrap();
        assert_eq!(words(found), vec!["foo", "food"]);
        assert_eq!(cache.len().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_select_leaves_store_intact() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo", "food"]).await.unwrap();

        let (gate, release) = gate(&cache.exec).await;

        let opts = options(2, 10);
        let query = Query::new("fo", "fo");
        let mut abandoned = Box::pin(cache.select(false, &opts, &query));
        enqueue(&mut abandoned).await;
        drop(abandoned);

        release.send(()).unwrap();
        gate.await.unwrap().unwrap();

        cache.insert(["fork"]).await.unwrap();
        let found = cache.select(false, &opts, &query).await.unwrap();
        assert_eq!(words(found), vec!["foo", "food", "fork"]);
    }

    #[tokio::test]
    async fn test_select_after_timeout() {
        let cache = WordCache::open().await.unwrap();
        cache.insert((0..2_000).map(|i| format!("word{i}"))).await.unwrap();

        let opts = MatchOptions { exact_matches: 0, fuzzy_cutoff: 1.0, look_ahead: 4, max_results: 10 };
        let query = Query::new("word1", "word1").limitless();
        let _ = tokio::time::timeout(Duration::from_micros(1), cache.select(false, &opts, &query)).await;

        let found = cache.select(false, &opts, &query).await.unwrap();
        assert_eq!(found.len(), 2_000);
    }

    #[tokio::test]
    async fn test_select_rejects_invalid_options() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["foo"]).await.unwrap();

        let result = cache.select(false, &options(2, 0), &Query::new("fo", "fo")).await;
        assert!(matches!(result, Err(Error::InvalidInput(ref msg)) if msg.contains("max_results")));

        let bad_cutoff = MatchOptions { fuzzy_cutoff: 2.0, ..options(2, 10) };
        let result = cache.select(false, &bad_cutoff, &Query::new("fo", "fo")).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        // Clearing ignores the match options.
        cache.select(true, &options(2, 0), &Query::default()).await.unwrap();
        assert!(cache.is_empty().await.unwrap());
    }

    #[test]
    fn test_sql_uses_registered_names() {
        let escape = format!("ESCAPE '{LIKE_ESCAPE}'");
        for sql in [SELECT_WORDS, SELECT_BACKUP_WORDS] {
            assert!(sql.contains(DISSIMILARITY_FN), "missing {DISSIMILARITY_FN} in {sql}");
            assert!(sql.contains(&escape), "missing {escape} in {sql}");
        }
    }

    #[tokio::test]
    async fn test_abandoned_select_runs_no_tier() {
        let cache = WordCache::open().await.unwrap();
        cache.insert(["Bar"]).await.unwrap();
        let params = SelectParams::new(&options(0, 10), &Query::new("xy", "zz"));

        let abandoned = CancellationToken::new();
        abandoned.cancel();
        let (skipped, ran) = cache
            .exec
            .submit(move |conn| {
                let skipped = select_tiers(conn, &params, &abandoned)?;
                let ran = select_tiers(conn, &params, &CancellationToken::new())?;
                Ok((skipped, ran))
            })
            .await
            .unwrap();

        assert!(skipped.is_empty());
        assert_eq!(ran, vec![Match::Backup { word: "Bar".into(), sort_key: "bar".into() }]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_aborts_running_select() {
        let (cache, opts, query, full) = slow_cache().await;

        let cancel = CancellationToken::new();
        let started = Instant::now();
        let running = tokio::spawn({
            let cache = cache.clone();
            let opts = opts.clone();
            let query = query.clone();
            let cancel = cancel.clone();
            async move { cache.select_until(false, &opts, &query, &cancel).await }
        });

        tokio::time::sleep(full / 4).await;
        cancel.cancel();
        assert!(matches!(running.await.unwrap(), Err(Error::Cancelled)));

        // The owner thread is free again well before the select would have finished.
        assert_eq!(cache.len().await.unwrap(), SLOW_ROWS);
        let freed = started.elapsed();
        assert!(freed < full, "owner busy for {freed:?}, uninterrupted select took {full:?}");

        let found = cache.select(false, &opts, &query).await.unwrap();
        assert_eq!(found.len(), SLOW_ROWS);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_forced_interrupt_empties_other_clone_select() {
        let (cache, opts, query, full) = slow_cache().await;

        let running = tokio::spawn({
            let cache = cache.clone();
            let opts = opts.clone();
            async move { cache.select(false, &opts, &query).await }
        });
        tokio::time::sleep(full / 4).await;

        // A second caller gives up while queued behind the running select;
        // its forced interrupt lands on that select.
        let cancel = CancellationToken::new();
        let queued = tokio::spawn({
            let cache = cache.clone();
            let cancel = cancel.clone();
            async move {
                cache
                    .select_until(false, &opts, &Query::new("word2", "word2"), &cancel)
                    .await
            }
        });
        tokio::time::sleep(full / 8).await;
        cancel.cancel();

        assert!(matches!(queued.await.unwrap(), Err(Error::Cancelled)));
        let aborted = running.await.unwrap().unwrap();
        assert_eq!(aborted.len(), 0);
        assert_eq!(cache.len().await.unwrap(), SLOW_ROWS);
    }
}
