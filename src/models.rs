//! Data models for collected articles.
//!
//! - [`Extracted`]: what an extractor pulled out of one page
//! - [`NewsArticle`]: the normalised article handed to the consumer

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::utils::collapse_whitespace;

/// Title and paragraphs pulled out of one fetched page.
///
/// A missing title is tolerated; an extractor that cannot find the body
/// container fails instead of producing an empty paragraph list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

impl Extracted {
    /// Join the title (when present) and paragraphs into one text blob.
    ///
    /// Each piece has its whitespace collapsed and empty pieces are dropped,
    /// so an absent or blank title never leaves a leading space.
    pub fn text(&self) -> String {
        self.title
            .iter()
            .chain(self.paragraphs.iter())
            .map(|piece| collapse_whitespace(piece))
            .filter(|piece| !piece.is_empty())
            .join(" ")
    }
}

/// A normalised news article as yielded by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    /// The URL the article was parsed from.
    pub source: String,
    /// Name of the outlet that discovered the URL.
    pub outlet: String,
    /// The article headline, if the page had one.
    pub title: Option<String>,
    /// Title and paragraphs joined into one plain-text blob.
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

impl NewsArticle {
    pub fn new(source: &str, outlet: &str, extracted: Extracted) -> Self {
        let content = extracted.text();
        Self {
            source: source.to_string(),
            outlet: outlet.to_string(),
            title: extracted
                .title
                .map(|t| collapse_whitespace(&t))
                .filter(|t| !t.is_empty()),
            content,
            fetched_at: Utc::now(),
        }
    }
}
