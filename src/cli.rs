//! Command-line interface definitions for the news collector.
//!
//! All options can be provided via command-line flags; the directory options
//! also fall back to environment variables.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::fetcher::{Backoff, RetryPolicy};

/// Command-line arguments for the news collector.
///
/// # Examples
///
/// ```sh
/// # Collect from the built-in outlets, articles to stdout
/// news_collector
///
/// # Custom outlet table, articles appended to a file
/// news_collector --config outlets.yaml --output articles.jsonl
///
/// # Show which URLs an outlet could not parse
/// news_collector failed BBC
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to an outlets YAML file (built-in table when absent)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the content cache
    #[arg(long, env = "NEWS_CACHE_DIR", default_value = ".content_cache", global = true)]
    pub cache_dir: PathBuf,

    /// Directory for per-outlet failed-href logs
    #[arg(long, env = "NEWS_FAILED_DIR", default_value = ".failed_hrefs", global = true)]
    pub failed_dir: PathBuf,

    /// Maximum fetch attempts per URL; 0 retries forever
    #[arg(long, default_value_t = 10, global = true)]
    pub max_attempts: u32,

    /// Seconds to wait between fetch attempts (the base delay when exponential)
    #[arg(long, default_value_t = 5, global = true)]
    pub retry_delay_secs: u64,

    /// Delay schedule between fetch attempts
    #[arg(long, value_enum, default_value_t = BackoffKind::Fixed, global = true)]
    pub backoff: BackoffKind,

    /// Upper bound in seconds on an exponential retry delay
    #[arg(long, default_value_t = 60, global = true)]
    pub max_delay_secs: u64,

    /// User agent to send; repeat to build a pool (built-in pool when absent)
    #[arg(long = "user-agent", global = true)]
    pub user_agents: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Collect articles from every outlet in round-robin order (default)
    Collect {
        /// Append articles as JSON lines to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fetch one article from every outlet concurrently per pass
        #[arg(long)]
        parallel: bool,

        /// Stop after this many articles
        #[arg(long)]
        limit: Option<usize>,

        /// Drain each outlet completely, one after another, instead of interleaving
        #[arg(long, conflicts_with = "parallel")]
        batch: bool,
    },
    /// Print the failed-href log of one outlet
    Failed { source: String },
    /// Re-run the failed hrefs of one outlet and print what now parses
    Reprocess { source: String },
    /// Delete the cached content of a URL so the next run re-fetches it
    Evict { url: String },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

impl Cli {
    /// The subcommand to run, `collect` with defaults when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Collect {
            output: None,
            parallel: false,
            limit: None,
            batch: false,
        })
    }

    /// Retry policy from `--max-attempts`, `--backoff` and the delay options.
    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::from_secs(self.retry_delay_secs);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(delay),
            BackoffKind::Exponential => Backoff::Exponential {
                base: delay,
                max: Duration::from_secs(self.max_delay_secs).max(delay),
            },
        };
        match self.max_attempts {
            0 => RetryPolicy::forever(backoff),
            n => RetryPolicy::bounded(n, backoff),
        }
    }
}
