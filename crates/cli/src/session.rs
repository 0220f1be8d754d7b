//! Line-at-a-time driver for the word cache.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use wordcache_core::{CacheConfig, Error, Query, WordCache, tokens};

/// Clears every stored word.
const CLEAR: &str = ":clear";
/// Prints the stored word count.
const COUNT: &str = ":count";

pub struct Session {
    cache: WordCache,
    config: CacheConfig,
    limitless: bool,
}

impl Session {
    pub fn new(cache: WordCache, config: CacheConfig, limitless: bool) -> Self {
        Self { cache, config, limitless }
    }

    /// Tokenize `text` and store its words. Returns how many distinct words were offered.
    pub async fn ingest(&self, text: &str) -> Result<usize> {
        let words = tokens::words(text, self.config.min_word_len);
        let offered = words.len();
        self.cache.insert(words).await?;
        Ok(offered)
    }

    /// Handle one input line and return the lines to print.
    ///
    /// A query that outlives the configured deadline is abandoned and prints nothing.
    pub async fn handle(&self, line: &str) -> Result<Vec<String>> {
        match line.trim_end() {
            CLEAR => {
                self.cache
                    .select(true, &self.config.match_options, &Query::default())
                    .await?;
                Ok(Vec::new())
            }
            COUNT => Ok(vec![self.cache.len().await?.to_string()]),
            text => {
                let lines = self.complete(text).await?;
                self.ingest(text).await?;
                Ok(lines)
            }
        }
    }

    async fn complete(&self, text: &str) -> Result<Vec<String>> {
        let query = tokens::cursor_query(text);
        let query = if self.limitless { query.limitless() } else { query };

        let cancel = CancellationToken::new();
        let deadline = tokio::spawn({
            let cancel = cancel.clone();
            let after = self.config.deadline();
            async move {
                tokio::time::sleep(after).await;
                cancel.cancel();
            }
        });

        let result = self
            .cache
            .select_until(false, &self.config.match_options, &query, &cancel)
            .await;
        deadline.abort();

        match result {
            Ok(matches) => Ok(matches
                .map(|m| serde_json::to_string(&m))
                .collect::<Result<Vec<_>, _>>()?),
            Err(Error::Cancelled) => {
                tracing::debug!(word = %query.word, deadline_ms = self.config.deadline_ms, "query missed deadline");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}
