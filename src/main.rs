//! # News Collector
//!
//! Collects news articles from several outlets, reduces each one to plain
//! text, and emits them as a single round-robin stream.
//!
//! ## Usage
//!
//! ```sh
//! news_collector --output articles.jsonl
//! ```
//!
//! ## Architecture
//!
//! 1. **Discovery**: each outlet scrapes its listing page for article URLs
//! 2. **Resolution**: the outlet's resolver picks an extractor for each URL
//! 3. **Fetching**: pages come from the content cache or the network, with retry
//! 4. **Collection**: outlets are interleaved one article per pass
//! 5. **Output**: articles are written as JSON lines

use clap::Parser;
use futures::StreamExt;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod collector;
mod config;
mod extractor;
mod fetcher;
mod models;
mod outputs;
mod resolver;
mod source;
mod utils;

use cache::ContentCache;
use cli::{Cli, Command};
use collector::Collector;
use fetcher::{Fetcher, UserAgents};
use outputs::json::JsonLinesWriter;
use source::Source;
use utils::{ensure_writable_dir, truncate_for_log};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_collector starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let fetcher = Arc::new(Fetcher::new(
        reqwest::Client::builder().build()?,
        ContentCache::new(&args.cache_dir),
        UserAgents::new(args.user_agents.clone()),
        args.retry_policy(),
    ));

    if let Command::Evict { url } = args.command() {
        let removed = fetcher.cache().evict(&url).await?;
        info!(%url, removed, "Cache eviction");
        return Ok(());
    }

    for dir in [&args.cache_dir, &args.failed_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let outlets = config::load_outlets(args.config.as_deref()).await?;
    let sources = outlets
        .iter()
        .map(|outlet| Source::from_config(outlet, Arc::clone(&fetcher), &args.failed_dir).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;
    info!(count = sources.len(), "Outlets ready");

    match args.command() {
        Command::Collect {
            output,
            limit,
            batch: true,
            ..
        } => collect_batch(&sources, output.as_deref(), limit).await?,
        Command::Collect {
            output,
            parallel,
            limit,
            batch: false,
        } => collect(&sources, output.as_deref(), parallel, limit).await?,
        Command::Failed { source } => {
            let source = find_source(&sources, &source)?;
            for href in source.failed_log().read_all().await? {
                println!("{href}");
            }
        }
        Command::Reprocess { source } => {
            let source = find_source(&sources, &source)?;
            let (articles, still_failing) = source.reprocess_failed().await?;
            let mut writer = JsonLinesWriter::open(None).await?;
            for article in &articles {
                writer.write(article).await?;
            }
            info!(
                recovered = articles.len(),
                still_failing = still_failing.len(),
                "Reprocessing complete"
            );
        }
        Command::Evict { .. } => {}
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn find_source<'a>(sources: &'a [Arc<Source>], name: &str) -> Result<&'a Arc<Source>, Box<dyn Error>> {
    sources
        .iter()
        .find(|s| s.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("unknown outlet `{name}`").into())
}

#[instrument(level = "info", skip(sources))]
async fn collect(
    sources: &[Arc<Source>],
    output: Option<&std::path::Path>,
    parallel: bool,
    limit: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let mut writer = JsonLinesWriter::open(output).await?;
    let collector = Collector::new(sources.iter().map(Source::cursor).collect()).parallel(parallel);
    info!(outlets = collector.live(), parallel, "Collecting round-robin");
    let mut stream = std::pin::pin!(collector.into_stream());

    let mut dropped = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(article) => {
                debug!(
                    source = %article.source,
                    preview = %truncate_for_log(&article.content, 120),
                    "Collected article"
                );
                writer.write(&article).await?;
                if limit.is_some_and(|limit| writer.written() >= limit) {
                    info!(limit = ?limit, "Article limit reached");
                    break;
                }
            }
            Err(e) => {
                dropped += 1;
                warn!(error = %e, "Outlet unavailable this run");
            }
        }
    }

    info!(
        articles = writer.written(),
        outlets_dropped = dropped,
        "Collection finished"
    );
    Ok(())
}

/// Drain one outlet completely before moving to the next.
#[instrument(level = "info", skip(sources))]
async fn collect_batch(
    sources: &[Arc<Source>],
    output: Option<&std::path::Path>,
    limit: Option<usize>,
) -> Result<(), Box<dyn Error>> {
    let mut writer = JsonLinesWriter::open(output).await?;
    let mut failed_total = 0usize;

    'outlets: for source in sources {
        let (articles, failed) = match source.fetch_all().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Outlet unavailable this run");
                continue;
            }
        };
        failed_total += failed.len();
        for article in &articles {
            writer.write(article).await?;
            if limit.is_some_and(|limit| writer.written() >= limit) {
                info!(limit = ?limit, "Article limit reached");
                break 'outlets;
            }
        }
    }

    info!(
        articles = writer.written(),
        failed_hrefs = failed_total,
        "Batch collection finished"
    );
    Ok(())
}
