//! Per-template article extraction.
//!
//! An [`ArticleExtractor`] turns a parsed page into a title and an ordered
//! list of paragraphs. Outlets differ only in which elements hold those, so
//! the one implementation in this crate, [`SelectorExtractor`], is driven
//! entirely by CSS selectors from the outlet configuration.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::config::ExtractorConfig;
use crate::utils::collapse_whitespace;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page has no element matching the body container selector.
    #[error("{extractor}: no body container matching `{selector}`")]
    MissingBody { extractor: String, selector: String },
}

/// Capability to pull an article out of one page template.
pub trait ArticleExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Headline text, if the page has one. Absence is not an error.
    fn title(&self, document: &Html) -> Option<String>;

    /// Paragraph texts in document order.
    ///
    /// # Errors
    ///
    /// [`ExtractError::MissingBody`] when the body container is absent.
    fn paragraphs(&self, document: &Html) -> Result<Vec<String>, ExtractError>;
}

/// Selector-driven extractor.
///
/// `title` selectors are tried in order and the first match wins; the
/// `paragraphs` selector is applied inside the first `body` match.
#[derive(Debug)]
pub struct SelectorExtractor {
    name: String,
    title: Vec<Selector>,
    body: Selector,
    body_source: String,
    paragraphs: Selector,
}

impl SelectorExtractor {
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, scraper::error::SelectorErrorKind<'_>> {
        let title = config
            .title
            .iter()
            .map(|s| Selector::parse(s))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: config.name.clone(),
            title,
            body: Selector::parse(&config.body)?,
            body_source: config.body.clone(),
            paragraphs: Selector::parse(&config.paragraphs)?,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

impl ArticleExtractor for SelectorExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self, document: &Html) -> Option<String> {
        self.title
            .iter()
            .find_map(|selector| document.select(selector).next())
            .map(element_text)
    }

    fn paragraphs(&self, document: &Html) -> Result<Vec<String>, ExtractError> {
        let body = document
            .select(&self.body)
            .next()
            .ok_or_else(|| ExtractError::MissingBody {
                extractor: self.name.clone(),
                selector: self.body_source.clone(),
            })?;

        Ok(body
            .select(&self.paragraphs)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect())
    }
}
