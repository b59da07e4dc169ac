//! Outlets: link discovery plus extraction.
//!
//! A [`Source`] scrapes its listing page for candidate article URLs,
//! skips denylisted ones, and runs the rest through its [`Resolver`].
//! URLs that cannot be parsed are appended to the outlet's failed-href
//! log (`<failed_dir>/<outlet name>`, one URL per line) and never abort
//! the run. Only an unreachable listing page is reported to the caller.
//!
//! Two ways to drive a source:
//! - [`Source::fetch_all`]: process every candidate, return articles and failures
//! - [`Source::cursor`]: lazy one-article-at-a-time cursor for the [`Collector`]
//!
//! [`Collector`]: crate::collector::Collector

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::collector::{ArticleCursor, Pull};
use crate::config::{ConfigError, OutletConfig};
use crate::fetcher::Fetcher;
use crate::models::NewsArticle;
use crate::resolver::{ResolveError, Resolver};

/// Failures that stop a source from producing anything this run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{outlet}: could not load {url}: {source}")]
    Transport {
        outlet: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{outlet}: {url} returned HTTP {status}")]
    Status {
        outlet: String,
        url: String,
        status: u16,
    },
}

/// Where an outlet lists its current articles.
#[derive(Debug)]
pub struct HomePage {
    url: Url,
    links: Selector,
    strip_fragment: bool,
}

impl HomePage {
    pub fn new(url: Url, links: Selector, strip_fragment: bool) -> Self {
        Self {
            url,
            links,
            strip_fragment,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Absolute http(s) article URLs linked from `html`, in page order.
    pub fn links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.links)
            .filter_map(|element| element.value().attr("href"))
            .filter_map(|href| self.url.join(href.trim()).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .map(|mut url| {
                if self.strip_fragment {
                    url.set_fragment(None);
                }
                url.to_string()
            })
            .collect()
    }
}

/// Append-only log of URLs that could not be parsed.
#[derive(Debug)]
pub struct FailedHrefLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FailedHrefLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `hrefs`, one per line, in a single write.
    pub async fn append(&self, hrefs: &[String]) -> io::Result<()> {
        if hrefs.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut buf = String::new();
        for href in hrefs {
            buf.push_str(href);
            buf.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await
    }

    /// Every logged URL, oldest first. A missing log reads as empty.
    pub async fn read_all(&self) -> io::Result<Vec<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// One outlet, built once at startup and shared read-only.
#[derive(Debug)]
pub struct Source {
    name: String,
    home: HomePage,
    denylist: Vec<String>,
    resolver: Arc<Resolver>,
    fetcher: Arc<Fetcher>,
    failed: FailedHrefLog,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        home: HomePage,
        denylist: Vec<String>,
        resolver: Arc<Resolver>,
        fetcher: Arc<Fetcher>,
        failed: FailedHrefLog,
    ) -> Self {
        Self {
            name: name.into(),
            home,
            denylist,
            resolver,
            fetcher,
            failed,
        }
    }

    pub fn from_config(
        config: &OutletConfig,
        fetcher: Arc<Fetcher>,
        failed_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let outlet_error = |reason: String| ConfigError::Outlet {
            outlet: config.name.clone(),
            reason,
        };
        let url = Url::parse(&config.home_page)
            .map_err(|e| outlet_error(format!("invalid home page `{}`: {e}", config.home_page)))?;
        let links = Selector::parse(&config.link_selector)
            .map_err(|e| outlet_error(format!("invalid link selector: {e}")))?;
        let resolver = Resolver::from_config(&config.name, &config.resolver)?;
        debug!(outlet = %config.name, rules = resolver.rules().len(), "Resolver built");

        Ok(Self::new(
            config.name.clone(),
            HomePage::new(url, links, config.strip_fragment),
            config.denylist.clone(),
            Arc::new(resolver),
            fetcher,
            FailedHrefLog::new(failed_dir.join(&config.name)),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn failed_log(&self) -> &FailedHrefLog {
        &self.failed
    }

    /// Plain substring containment, no normalisation.
    pub fn is_denied(&self, url: &str) -> bool {
        self.denylist.iter().any(|entry| url.contains(entry.as_str()))
    }

    /// Fetch the listing page and return candidate article URLs.
    ///
    /// The listing page always comes from the network; it changes between
    /// runs, so it bypasses the content cache.
    #[instrument(level = "info", skip_all, fields(source = %self.name))]
    pub async fn discover(&self) -> Result<Vec<String>, SourceError> {
        let home = self.home.url().as_str();
        let response = self
            .client()
            .get(home)
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                outlet: self.name.clone(),
                url: home.to_string(),
                source,
            })?;
        if response.status() != StatusCode::OK {
            return Err(SourceError::Status {
                outlet: self.name.clone(),
                url: home.to_string(),
                status: response.status().as_u16(),
            });
        }
        let html = response.text().await.map_err(|source| SourceError::Transport {
            outlet: self.name.clone(),
            url: home.to_string(),
            source,
        })?;

        let urls = self.home.links(&html);
        info!(count = urls.len(), %home, "Indexed article URLs");
        debug!(urls = ?urls, "Candidate URLs");
        Ok(urls)
    }

    fn client(&self) -> &Client {
        self.fetcher.client()
    }

    /// Resolve, fetch and extract one article URL.
    pub async fn parse_article(&self, url: &str) -> Result<NewsArticle, ResolveError> {
        let extracted = self.resolver.parse(&self.fetcher, url).await?;
        Ok(NewsArticle::new(url, &self.name, extracted))
    }

    async fn record_failed(&self, hrefs: &[String]) {
        if let Err(e) = self.failed.append(hrefs).await {
            error!(
                source = %self.name,
                path = %self.failed.path().display(),
                error = %e,
                count = hrefs.len(),
                "Failed to write failed-href log"
            );
        }
    }

    async fn run_all(&self, urls: Vec<String>) -> (Vec<NewsArticle>, Vec<String>) {
        let mut articles = Vec::new();
        let mut failed = Vec::new();
        for url in urls {
            if self.is_denied(&url) {
                debug!(%url, "Skipping denylisted URL");
                continue;
            }
            match self.parse_article(&url).await {
                Ok(article) => articles.push(article),
                Err(e) => {
                    error!(source = %self.name, %url, error = %e, "Could not parse article");
                    failed.push(url);
                }
            }
        }
        (articles, failed)
    }

    /// Process every candidate URL.
    ///
    /// Returns the parsed articles and the URLs that failed; the failures
    /// are also appended to the outlet's failed-href log.
    ///
    /// # Errors
    ///
    /// Only when the listing page cannot be fetched.
    #[instrument(level = "info", skip_all, fields(source = %self.name))]
    pub async fn fetch_all(&self) -> Result<(Vec<NewsArticle>, Vec<String>), SourceError> {
        let urls = self.discover().await?;
        let (articles, failed) = self.run_all(urls).await;
        self.record_failed(&failed).await;
        info!(articles = articles.len(), failed = failed.len(), "Fetched outlet");
        Ok((articles, failed))
    }

    /// Re-run the URLs in the failed-href log. The log is not modified.
    #[instrument(level = "info", skip_all, fields(source = %self.name))]
    pub async fn reprocess_failed(&self) -> io::Result<(Vec<NewsArticle>, Vec<String>)> {
        let urls = self.failed.read_all().await?;
        info!(count = urls.len(), "Reprocessing failed hrefs");
        Ok(self.run_all(urls).await)
    }

    /// A lazy cursor over this outlet's articles. Discovery happens on the
    /// first pull.
    pub fn cursor(self: &Arc<Self>) -> SourceCursor {
        SourceCursor {
            source: Arc::clone(self),
            pending: None,
        }
    }
}

pub struct SourceCursor {
    source: Arc<Source>,
    pending: Option<VecDeque<String>>,
}

impl ArticleCursor for SourceCursor {
    fn label(&self) -> &str {
        self.source.name()
    }

    /// Consume candidate URLs until one parses or fails.
    ///
    /// Denylisted URLs do not use up the pull. A URL that fails is logged
    /// immediately and reported as [`Pull::NotReady`].
    async fn pull(&mut self) -> Pull {
        if self.pending.is_none() {
            match self.source.discover().await {
                Ok(urls) => self.pending = Some(urls.into()),
                Err(e) => {
                    error!(source = %self.source.name(), error = %e, "Link discovery failed");
                    return Pull::Failed(e);
                }
            }
        }
        let Some(pending) = self.pending.as_mut() else {
            return Pull::Exhausted;
        };

        while let Some(url) = pending.pop_front() {
            if self.source.is_denied(&url) {
                debug!(%url, "Skipping denylisted URL");
                continue;
            }
            return match self.source.parse_article(&url).await {
                Ok(article) => Pull::Article(article),
                Err(e) => {
                    warn!(source = %self.source.name(), %url, error = %e, "Could not parse article");
                    self.source.record_failed(&[url]).await;
                    Pull::NotReady
                }
            };
        }
        Pull::Exhausted
    }
}
