//! Extractor selection for article URLs.
//!
//! A [`Resolver`] holds an optional default extractor and an ordered list
//! of [`ExtractionRule`]s. Each rule pairs a URL substring with either a
//! concrete extractor or another resolver, so outlets with several
//! sections can nest their templates.
//!
//! # Selection
//!
//! Among rules whose pattern occurs in the URL, the one whose first
//! occurrence starts furthest to the right wins; on a tie the longer
//! pattern wins, then the earlier rule. With rules `site/news/` and
//! `site/news/sport/`, the URL `https://site/news/sport/1` picks the
//! second. When nothing matches, the default extractor is used.
//!
//! # Fallback
//!
//! The page is fetched once. If the chosen extractor cannot find its body
//! container, the resolver's other rules are tried against the same
//! document in declared order, then the default extractor. Patterns are not
//! consulted during fallback: a nested resolver reached this way has all of
//! its rules walked in order, then its own default. Only when all of
//! them fail does [`Resolver::parse`] return [`ResolveError::Exhausted`].

use scraper::Html;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{ConfigError, ExtractorConfig, ResolverConfig};
use crate::extractor::{ArticleExtractor, SelectorExtractor};
use crate::fetcher::{FetchError, Fetcher};
use crate::models::Extracted;

/// Why a URL could not be turned into an article.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no extractor applies to {url}")]
    NoMatch { url: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("could not parse {url} (tried {})", attempted.join(", "))]
    Exhausted { url: String, attempted: Vec<String> },
}

/// What a rule points at.
#[derive(Clone)]
pub enum ExtractorRef {
    Extractor(Arc<dyn ArticleExtractor>),
    Resolver(Arc<Resolver>),
}

impl ExtractorRef {
    pub fn name(&self) -> &str {
        match self {
            ExtractorRef::Extractor(extractor) => extractor.name(),
            ExtractorRef::Resolver(resolver) => resolver.name(),
        }
    }
}

impl fmt::Debug for ExtractorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorRef::Extractor(e) => f.debug_tuple("Extractor").field(&e.name()).finish(),
            ExtractorRef::Resolver(r) => f.debug_tuple("Resolver").field(r).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub pattern: String,
    pub target: ExtractorRef,
}

impl ExtractionRule {
    pub fn new(pattern: impl Into<String>, target: ExtractorRef) -> Self {
        Self {
            pattern: pattern.into(),
            target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Rule(usize),
    Default,
}

/// Outcome of one attempt below the top level.
enum Failure {
    NoMatch,
    Exhausted,
}

pub struct Resolver {
    name: String,
    default: Option<Arc<dyn ArticleExtractor>>,
    rules: Vec<ExtractionRule>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("name", &self.name)
            .field("default", &self.default.as_ref().map(|d| d.name().to_string()))
            .field("rules", &self.rules)
            .finish()
    }
}

fn build_extractor(config: &ExtractorConfig) -> Result<Arc<dyn ArticleExtractor>, ConfigError> {
    let extractor = SelectorExtractor::from_config(config).map_err(|e| ConfigError::Selector {
        extractor: config.name.clone(),
        reason: e.to_string(),
    })?;
    Ok(Arc::new(extractor))
}

impl Resolver {
    pub fn new(
        name: impl Into<String>,
        default: Option<Arc<dyn ArticleExtractor>>,
        rules: Vec<ExtractionRule>,
    ) -> Self {
        Self {
            name: name.into(),
            default,
            rules,
        }
    }

    /// Build a resolver tree from configuration.
    ///
    /// A rule without nested rules becomes a plain extractor; one with
    /// nested rules becomes a nested resolver named after its pattern.
    pub fn from_config(name: &str, config: &ResolverConfig) -> Result<Self, ConfigError> {
        if config.extractor.is_none() && config.rules.is_empty() {
            return Err(ConfigError::EmptyResolver {
                context: name.to_string(),
            });
        }

        let default = config.extractor.as_ref().map(build_extractor).transpose()?;
        let rules = config
            .rules
            .iter()
            .map(|rule| -> Result<ExtractionRule, ConfigError> {
                let target = match (&rule.target.extractor, rule.target.rules.is_empty()) {
                    (Some(extractor), true) => ExtractorRef::Extractor(build_extractor(extractor)?),
                    _ => {
                        let nested = format!("{name}[{}]", rule.pattern);
                        ExtractorRef::Resolver(Arc::new(Resolver::from_config(&nested, &rule.target)?))
                    }
                };
                Ok(ExtractionRule::new(rule.pattern.clone(), target))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(name, default, rules))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    fn candidate(&self, url: &str) -> Option<Candidate> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (i, rule) in self.rules.iter().enumerate() {
            let Some(pos) = url.find(&rule.pattern) else {
                continue;
            };
            let len = rule.pattern.len();
            let better = match best {
                None => true,
                Some((best_pos, best_len, _)) => pos > best_pos || (pos == best_pos && len > best_len),
            };
            if better {
                best = Some((pos, len, i));
            }
        }

        match best {
            Some((_, _, i)) => Some(Candidate::Rule(i)),
            None if self.default.is_some() => Some(Candidate::Default),
            None => None,
        }
    }

    /// Name of the extractor or nested resolver chosen for `url`.
    pub fn select(&self, url: &str) -> Option<&str> {
        match self.candidate(url)? {
            Candidate::Rule(i) => Some(self.rules[i].target.name()),
            Candidate::Default => self.default.as_ref().map(|d| d.name()),
        }
    }

    /// Extract an article from an already-fetched document.
    ///
    /// # Errors
    ///
    /// [`ResolveError::NoMatch`] when no rule or default applies, and
    /// [`ResolveError::Exhausted`] when every applicable extractor failed.
    pub fn extract(&self, url: &str, document: &Html) -> Result<Extracted, ResolveError> {
        let mut attempted = Vec::new();
        self.extract_with(url, document, &mut attempted)
            .map_err(|failure| match failure {
                Failure::NoMatch => ResolveError::NoMatch {
                    url: url.to_string(),
                },
                Failure::Exhausted => ResolveError::Exhausted {
                    url: url.to_string(),
                    attempted,
                },
            })
    }

    /// Fetch `url` once and extract it.
    #[instrument(level = "info", skip_all, fields(resolver = %self.name, %url))]
    pub async fn parse(&self, fetcher: &Fetcher, url: &str) -> Result<Extracted, ResolveError> {
        if self.candidate(url).is_none() {
            return Err(ResolveError::NoMatch {
                url: url.to_string(),
            });
        }
        let fetched = fetcher.fetch(url).await?;
        debug!(origin = ?fetched.origin, bytes = fetched.body.len(), "Page fetched");
        let document = Html::parse_document(&fetched.body);
        self.extract(url, &document)
    }

    fn extract_with(
        &self,
        url: &str,
        document: &Html,
        attempted: &mut Vec<String>,
    ) -> Result<Extracted, Failure> {
        let chosen = self.candidate(url).ok_or(Failure::NoMatch)?;
        debug!(resolver = %self.name, extractor = ?self.select(url), %url, "Chosen extractor");

        if let Some(extracted) = self.try_candidate(chosen, url, document, attempted, false) {
            return Ok(extracted);
        }
        self.extract_remaining(Some(chosen), url, document, attempted)
            .ok_or(Failure::Exhausted)
    }

    /// Every rule in declared order, then the default, skipping `tried`.
    /// Patterns are ignored here; nested resolvers are walked the same way.
    fn extract_remaining(
        &self,
        tried: Option<Candidate>,
        url: &str,
        document: &Html,
        attempted: &mut Vec<String>,
    ) -> Option<Extracted> {
        let candidates = (0..self.rules.len())
            .map(Candidate::Rule)
            .chain(self.default.is_some().then_some(Candidate::Default));
        for candidate in candidates {
            if tried == Some(candidate) {
                continue;
            }
            if let Some(extracted) = self.try_candidate(candidate, url, document, attempted, true) {
                return Some(extracted);
            }
        }
        None
    }

    fn try_candidate(
        &self,
        candidate: Candidate,
        url: &str,
        document: &Html,
        attempted: &mut Vec<String>,
        fallback: bool,
    ) -> Option<Extracted> {
        let extractor = match candidate {
            Candidate::Default => self.default.as_ref()?,
            Candidate::Rule(i) => match &self.rules[i].target {
                ExtractorRef::Extractor(extractor) => extractor,
                ExtractorRef::Resolver(nested) if fallback => {
                    return nested.extract_remaining(None, url, document, attempted);
                }
                ExtractorRef::Resolver(nested) => {
                    return nested.extract_with(url, document, attempted).ok();
                }
            },
        };

        attempted.push(extractor.name().to_string());
        match extractor.paragraphs(document) {
            Ok(paragraphs) => Some(Extracted {
                title: extractor.title(document),
                paragraphs,
            }),
            Err(e) => {
                debug!(extractor = extractor.name(), error = %e, %url, "Extractor failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::fetcher::{Backoff, RetryPolicy, UserAgents};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn selector(name: &str, body: &str) -> Arc<dyn ArticleExtractor> {
        build_extractor(&ExtractorConfig {
            name: name.to_string(),
            title: vec!["h1".to_string()],
            body: body.to_string(),
            paragraphs: "p".to_string(),
        })
        .unwrap()
    }

    fn leaf(pattern: &str, name: &str, body: &str) -> ExtractionRule {
        ExtractionRule::new(pattern, ExtractorRef::Extractor(selector(name, body)))
    }

    #[test]
    fn test_rightmost_match_wins() {
        let resolver = Resolver::new(
            "site",
            None,
            vec![
                leaf("site/news/", "P1", "div.news"),
                leaf("site/news/sport/", "P2", "div.sport"),
            ],
        );
        assert_eq!(resolver.select("https://site/news/sport/123"), Some("P2"));
        assert_eq!(resolver.select("https://site/news/politics/1"), Some("P1"));
        assert_eq!(resolver.select("https://other/page"), None);
    }

    #[test]
    fn test_later_start_beats_longer_pattern() {
        let resolver = Resolver::new(
            "site",
            None,
            vec![leaf("site/news/", "general", "a"), leaf("live/", "live", "b")],
        );
        assert_eq!(resolver.select("https://site/news/live/9"), Some("live"));
    }

    #[test]
    fn test_default_used_when_nothing_matches() {
        let resolver = Resolver::new(
            "site",
            Some(selector("base", "article")),
            vec![leaf("site/sport/", "sport", "div.sport")],
        );
        assert_eq!(resolver.select("https://site/culture/1"), Some("base"));
        let doc = Html::parse_document("<h1>T</h1><article><p>Body</p></article>");
        let extracted = resolver.extract("https://site/culture/1", &doc).unwrap();
        assert_eq!(extracted.text(), "T Body");
    }

    #[test]
    fn test_no_match_without_default() {
        let resolver = Resolver::new("site", None, vec![leaf("site/sport/", "sport", "div.sport")]);
        let doc = Html::parse_document("<div class=\"sport\"><p>x</p></div>");
        assert!(matches!(
            resolver.extract("https://site/culture/1", &doc),
            Err(ResolveError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_fallback_to_sub_extractor() {
        let resolver = Resolver::new(
            "site",
            Some(selector("base", "div.story-body")),
            vec![
                leaf("site/three/", "three", "div.long-body"),
                leaf("site/round/", "round", "section.round-body"),
            ],
        );
        let doc = Html::parse_document(
            "<h1>Round up</h1><section class=\"round-body\"><p>Kids news.</p></section>",
        );
        let extracted = resolver.extract("https://site/news/1", &doc).unwrap();
        assert_eq!(extracted.title.as_deref(), Some("Round up"));
        assert_eq!(extracted.paragraphs, vec!["Kids news."]);
    }

    #[test]
    fn test_exhausted_fallback_names_url_and_chain() {
        let resolver = Resolver::new(
            "site",
            Some(selector("base", "div.story-body")),
            vec![
                leaf("site/three/", "three", "div.long-body"),
                leaf("site/round/", "round", "section.round-body"),
            ],
        );
        let doc = Html::parse_document("<h1>Nothing useful</h1>");
        match resolver.extract("https://site/round/7", &doc) {
            Err(ResolveError::Exhausted { url, attempted }) => {
                assert_eq!(url, "https://site/round/7");
                assert_eq!(attempted, vec!["round", "three", "base"]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_resolver_is_tried() {
        let nested = Resolver::new(
            "site[site/news/]",
            Some(selector("news", "div.news")),
            vec![leaf("site/news/live/", "live", "div.live")],
        );
        let resolver = Resolver::new(
            "site",
            None,
            vec![ExtractionRule::new(
                "site/news/",
                ExtractorRef::Resolver(Arc::new(nested)),
            )],
        );
        assert_eq!(resolver.select("https://site/news/live/1"), Some("site[site/news/]"));

        // live template chosen, but the page uses the plain news layout
        let doc = Html::parse_document("<div class=\"news\"><p>Plain</p></div>");
        let extracted = resolver.extract("https://site/news/live/1", &doc).unwrap();
        assert_eq!(extracted.paragraphs, vec!["Plain"]);
    }

    #[test]
    fn test_fallback_walks_nested_rules_that_do_not_match() {
        let nested = Resolver::new(
            "site[site/news/]",
            None,
            vec![leaf("site/news/live/", "live", "div.live")],
        );
        let resolver = Resolver::new(
            "site",
            Some(selector("base", "div.story-body")),
            vec![
                ExtractionRule::new("site/news/", ExtractorRef::Resolver(Arc::new(nested))),
                leaf("site/sport/", "sport", "div.sport"),
            ],
        );
        let doc = Html::parse_document("<div class=\"live\"><p>Live text</p></div>");
        let extracted = resolver.extract("https://site/sport/1", &doc).unwrap();
        assert_eq!(extracted.paragraphs, vec!["Live text"]);

        let empty = Html::parse_document("<p>none</p>");
        match resolver.extract("https://site/sport/1", &empty) {
            Err(ResolveError::Exhausted { attempted, .. }) => {
                assert_eq!(attempted, vec!["sport", "live", "base"]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_title_is_not_a_failure() {
        let resolver = Resolver::new("site", Some(selector("base", "article")), vec![]);
        let doc = Html::parse_document("<article><p>Only body</p></article>");
        let extracted = resolver.extract("https://site/x", &doc).unwrap();
        assert_eq!(extracted.title, None);
        assert_eq!(extracted.text(), "Only body");
    }

    #[test]
    fn test_from_config_builds_nested_tree() {
        let config: ResolverConfig = serde_yaml::from_str(
            r#"
rules:
  - pattern: site/news/
    extractor: { name: news, body: div.news }
    rules:
      - pattern: site/news/live/
        extractor: { name: live, body: div.live }
  - pattern: site/sport/
    extractor: { name: sport, body: div.sport }
"#,
        )
        .unwrap();
        let resolver = Resolver::from_config("Site", &config).unwrap();
        assert_eq!(resolver.rules().len(), 2);
        assert!(matches!(resolver.rules()[0].target, ExtractorRef::Resolver(_)));
        assert!(matches!(resolver.rules()[1].target, ExtractorRef::Extractor(_)));
        assert_eq!(resolver.select("https://site/sport/1"), Some("sport"));
        assert_eq!(resolver.select("https://site/news/1"), Some("Site[site/news/]"));
    }

    #[test]
    fn test_from_config_rejects_bad_selector_and_empty_resolver() {
        let bad: ResolverConfig =
            serde_yaml::from_str("extractor: { name: broken, body: \"div[\" }").unwrap();
        assert!(matches!(
            Resolver::from_config("X", &bad),
            Err(ConfigError::Selector { extractor, .. }) if extractor == "broken"
        ));
        assert!(matches!(
            Resolver::from_config("X", &ResolverConfig::default()),
            Err(ConfigError::EmptyResolver { .. })
        ));
    }

    #[tokio::test]
    async fn test_parse_fetches_once_and_extracts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<h1>Head</h1><div class=\"late\"><p>Late body</p></div>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(
            reqwest::Client::new(),
            ContentCache::new(tmp.path()),
            UserAgents::fixed("test"),
            RetryPolicy::bounded(1, Backoff::Fixed(Duration::from_millis(1))),
        );
        let resolver = Resolver::new(
            "site",
            Some(selector("base", "div.early")),
            vec![leaf("/never/", "late", "div.late")],
        );

        let url = format!("{}/news/1", server.uri());
        let extracted = resolver.parse(&fetcher, &url).await.unwrap();
        assert_eq!(extracted.text(), "Head Late body");
    }

    #[tokio::test]
    async fn test_parse_without_match_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(
            reqwest::Client::new(),
            ContentCache::new(tmp.path()),
            UserAgents::fixed("test"),
            RetryPolicy::bounded(1, Backoff::Fixed(Duration::from_millis(1))),
        );
        let resolver = Resolver::new("site", None, vec![leaf("/sport/", "sport", "div")]);
        let err = resolver
            .parse(&fetcher, &format!("{}/news/1", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatch { .. }));
    }
}
