//! wordcache entry point.
//!
//! Seeds the cache from corpus files, then treats every stdin line as the text
//! before a cursor and prints the matches as JSON lines on stdout.
//! Logging goes to stderr so stdout carries results only.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use wordcache_core::{CacheConfig, WordCache};

mod session;

use session::Session;

/// In-memory fuzzy word completion over a stream of observed text.
#[derive(Parser, Debug)]
#[command(name = "wordcache", version, about, long_about = None)]
struct Cli {
    /// Files whose words seed the cache before stdin is read.
    #[arg(long = "corpus", value_name = "FILE")]
    corpus: Vec<PathBuf>,

    /// Return every match instead of capping at max_results.
    #[arg(long)]
    limitless: bool,

    /// Emit logs as JSON objects.
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = CacheConfig::load()?;
    let session = Session::new(WordCache::open().await?, config, cli.limitless);

    for path in &cli.corpus {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read corpus {}", path.display()))?;
        let words = session.ingest(&text).await?;
        tracing::info!(path = %path.display(), words, "ingested corpus");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        for out in session.handle(&line).await? {
            stdout.write_all(out.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
    }

    Ok(())
}
