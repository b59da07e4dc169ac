//! Outlet configuration.
//!
//! Outlets are described in YAML: where to find candidate links, which
//! links to skip, and a resolver tree of extractors. The built-in table
//! (`outlets.yaml` at the crate root) is compiled in and used whenever no
//! `--config` file is given.
//!
//! ```yaml
//! - name: BBC
//!   home_page: https://www.bbc.co.uk
//!   link_selector: a.top-story
//!   denylist: [sport, programmes]
//!   extractor: { name: bbc-news, title: [h1], body: div.story-body__inner }
//!   rules:
//!     - pattern: www.bbc.co.uk/sport/
//!       extractor: { name: bbc-sport, title: [h1], body: "div#story-body" }
//! ```
//!
//! A rule may carry its own `rules`, which turns it into a nested resolver.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

const BUILTIN_OUTLETS: &str = include_str!("../outlets.yaml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid outlet configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("extractor `{extractor}` has an invalid selector: {reason}")]
    Selector { extractor: String, reason: String },
    #[error("outlet `{outlet}`: {reason}")]
    Outlet { outlet: String, reason: String },
    #[error("{context}: resolver needs an extractor or at least one rule")]
    EmptyResolver { context: String },
    #[error("outlet `{0}` is defined more than once")]
    DuplicateOutlet(String),
    #[error("outlet name `{0}` cannot be used as a file name")]
    InvalidName(String),
    #[error("no outlets configured")]
    NoOutlets,
}

fn default_paragraphs() -> String {
    "p".to_string()
}

/// Selectors for one page template.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub name: String,
    /// Headline selectors, tried in order.
    #[serde(default)]
    pub title: Vec<String>,
    /// Selector of the element that contains the article body.
    pub body: String,
    /// Selector for paragraph elements inside the body.
    #[serde(default = "default_paragraphs")]
    pub paragraphs: String,
}

/// A default extractor plus prioritised URL rules.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ResolverConfig {
    #[serde(default)]
    pub extractor: Option<ExtractorConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    /// Substring looked for in the article URL.
    pub pattern: String,
    #[serde(flatten)]
    pub target: ResolverConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OutletConfig {
    pub name: String,
    /// Listing page the candidate links are scraped from.
    pub home_page: String,
    /// Selector matching the `<a href>` elements of candidate articles.
    pub link_selector: String,
    /// Drop `#fragment` parts from discovered links.
    #[serde(default)]
    pub strip_fragment: bool,
    /// Links containing any of these substrings are skipped.
    #[serde(default)]
    pub denylist: Vec<String>,
    #[serde(flatten)]
    pub resolver: ResolverConfig,
}

/// Parse and validate an outlet table.
pub fn parse_outlets(yaml: &str) -> Result<Vec<OutletConfig>, ConfigError> {
    let outlets: Vec<OutletConfig> = serde_yaml::from_str(yaml)?;
    if outlets.is_empty() {
        return Err(ConfigError::NoOutlets);
    }

    let mut seen = HashSet::new();
    for outlet in &outlets {
        let name = outlet.name.as_str();
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidName(outlet.name.clone()));
        }
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateOutlet(outlet.name.clone()));
        }
    }
    Ok(outlets)
}

/// Load the outlet table from `path`, or the built-in table when `None`.
#[instrument(level = "info")]
pub async fn load_outlets(path: Option<&Path>) -> Result<Vec<OutletConfig>, ConfigError> {
    let outlets = match path {
        Some(path) => {
            let yaml = tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            parse_outlets(&yaml)?
        }
        None => parse_outlets(BUILTIN_OUTLETS)?,
    };
    info!(count = outlets.len(), "Loaded outlet configuration");
    Ok(outlets)
}
