//! Page fetching with cache lookup and retry.
//!
//! [`Fetcher::fetch`] first consults the [`ContentCache`]. On a miss it
//! issues GET requests, each with a user agent drawn from the configured
//! [`UserAgents`] pool, until one comes back `200 OK` or the
//! [`RetryPolicy`] runs out of attempts. The successful body is written
//! to the cache before being returned.
//!
//! # Retry Strategy
//!
//! Any non-200 status or transport error counts as a failed attempt. The
//! delay between attempts comes from [`Backoff`]:
//!
//! ```text
//! Fixed(d):                 d
//! Exponential{base, max}:   min(base * 2^(attempt-1), max) + random_jitter(0..250ms)
//! ```
//!
//! A policy built with `RetryPolicy::forever` never gives up; every other
//! policy ends with [`FetchError::Exhausted`].

use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::cache::ContentCache;

const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Errors returned by [`Fetcher::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempts (last: {last})")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

/// Where a fetched body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

/// Raw page content plus provenance. Lives for one parse call.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub body: String,
    pub origin: Origin,
}

/// Pool of client identity strings, one picked at random per request.
#[derive(Debug, Clone)]
pub struct UserAgents {
    pool: Vec<String>,
}

impl UserAgents {
    /// Build a pool; an empty list falls back to the built-in pool.
    pub fn new(pool: Vec<String>) -> Self {
        if pool.is_empty() {
            return Self::default();
        }
        Self { pool }
    }

    /// A pool that always yields the same identity.
    #[cfg(test)]
    pub fn fixed(agent: impl Into<String>) -> Self {
        Self {
            pool: vec![agent.into()],
        }
    }

    pub fn pick(&self) -> &str {
        self.pool
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENTS[0])
    }
}

impl Default for UserAgents {
    fn default() -> Self {
        Self {
            pool: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Delay schedule between fetch attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(31);
                let delay = base.saturating_mul(1u32 << shift).min(max);
                let jitter_ms: u64 = rand::rng().random_range(0..=250);
                delay + Duration::from_millis(jitter_ms)
            }
        }
    }
}

/// How many times to try a URL and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until the origin answers `200 OK`.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn forever(backoff: Backoff) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    pub fn bounded(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            backoff,
        }
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::bounded(10, Backoff::Fixed(Duration::from_secs(5)))
    }
}

/// Turns URLs into raw page bodies, through the cache when possible.
pub struct Fetcher {
    client: Client,
    cache: ContentCache,
    agents: UserAgents,
    retry: RetryPolicy,
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("cache", &self.cache.dir())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Fetcher {
    pub fn new(client: Client, cache: ContentCache, agents: UserAgents, retry: RetryPolicy) -> Self {
        Self {
            client,
            cache,
            agents,
            retry,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Fetch the raw body of `url`.
    ///
    /// A non-empty cache entry is returned verbatim without touching the
    /// network. Otherwise the origin is retried per the [`RetryPolicy`] and
    /// the first `200 OK` body is cached and returned.
    ///
    /// # Errors
    ///
    /// [`FetchError::Exhausted`] once the policy's attempt limit is hit.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        if let Some(body) = self.cache.get(url).await {
            debug!(bytes = body.len(), "Cache hit");
            return Ok(FetchResult {
                body,
                origin: Origin::Cache,
            });
        }
        debug!("Cache miss");

        let t0 = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let last = match self.attempt(url).await {
                Ok(body) => {
                    debug!(attempt, bytes = body.len(), "Fetched from network");
                    if let Err(e) = self.cache.put(url, &body).await {
                        warn!(error = %e, "Failed to cache content; continuing");
                    }
                    return Ok(FetchResult {
                        body,
                        origin: Origin::Network,
                    });
                }
                Err(last) => last,
            };

            if self.retry.exhausted(attempt) {
                error!(
                    attempt,
                    elapsed_ms_total = t0.elapsed().as_millis(),
                    last = %last,
                    "fetch exhausted retries"
                );
                return Err(FetchError::Exhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    last,
                });
            }

            let delay = self.retry.backoff.delay(attempt);
            warn!(attempt, ?delay, last = %last, "fetch attempt failed; backing off");
            sleep(delay).await;
        }
    }

    /// One GET with a fresh identity. `Err` carries a description of why
    /// the attempt did not count as a success.
    async fn attempt(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.agents.pick())
            .send()
            .await
            .map_err(|e| format!("transport error: {e}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("HTTP {status}"));
        }
        response
            .text()
            .await
            .map_err(|e| format!("body read error: {e}"))
    }
}
