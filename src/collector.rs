//! Round-robin merge of per-outlet article cursors.
//!
//! The [`Collector`] visits its live cursors in the order they were
//! supplied, taking at most one article from each per pass:
//!
//! - [`Pull::Article`] is yielded straight away, then the next cursor is visited
//! - [`Pull::NotReady`] skips this position for the current pass
//! - [`Pull::Exhausted`] removes the cursor from the live set
//! - [`Pull::Failed`] removes the cursor and yields its error once
//!
//! The stream ends when no live cursors remain. With three outlets that
//! each have `k` articles the output is `A1, B1, C1, A2, B2, C2, ...`.
//!
//! In parallel mode every cursor is pulled concurrently at the start of a
//! pass and the results are then handed out in the same fixed order, so the
//! output sequence is identical to sequential mode.

use futures::future::join_all;
use futures::stream::{self, Stream};
use tracing::{debug, info, warn};

use crate::models::NewsArticle;
use crate::source::SourceError;

/// Result of asking a cursor for its next article.
#[derive(Debug)]
pub enum Pull {
    Article(NewsArticle),
    /// Nothing to hand out for this pull; ask again next pass.
    NotReady,
    /// No more candidates, ever.
    Exhausted,
    /// The cursor cannot go on (e.g. its listing page is unreachable).
    Failed(SourceError),
}

/// A per-outlet position in its lazy article sequence.
pub trait ArticleCursor {
    fn label(&self) -> &str;

    async fn pull(&mut self) -> Pull;
}

pub struct Collector<C> {
    cursors: Vec<C>,
    position: usize,
    passes: u64,
    parallel: bool,
    prefetched: Vec<Option<Pull>>,
}

impl<C: ArticleCursor> Collector<C> {
    pub fn new(cursors: Vec<C>) -> Self {
        Self {
            cursors,
            position: 0,
            passes: 0,
            parallel: false,
            prefetched: Vec::new(),
        }
    }

    /// Pull every live cursor concurrently at the start of each pass.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Number of cursors still live.
    pub fn live(&self) -> usize {
        self.cursors.len()
    }

    /// Turn the collector into a lazy stream of articles.
    ///
    /// Per-article failures never appear here; an `Err` means one cursor
    /// failed for good and has been dropped from the rotation.
    pub fn into_stream(self) -> impl Stream<Item = Result<NewsArticle, SourceError>> {
        stream::unfold(self, |mut collector| async move {
            let item = collector.next_item().await?;
            Some((item, collector))
        })
    }

    pub async fn next_item(&mut self) -> Option<Result<NewsArticle, SourceError>> {
        loop {
            if self.cursors.is_empty() {
                return None;
            }
            if self.position >= self.cursors.len() {
                self.position = 0;
                self.passes += 1;
                self.prefetched.clear();
                debug!(pass = self.passes, live = self.cursors.len(), "Starting collector pass");
            }
            if self.parallel && self.position == 0 && self.prefetched.is_empty() {
                self.prefetched = join_all(self.cursors.iter_mut().map(|c| c.pull()))
                    .await
                    .into_iter()
                    .map(Some)
                    .collect();
            }

            let prefetched = self.prefetched.get_mut(self.position).and_then(Option::take);
            let step = match prefetched {
                Some(step) => step,
                None => self.cursors[self.position].pull().await,
            };

            match step {
                Pull::Article(article) => {
                    self.position += 1;
                    return Some(Ok(article));
                }
                Pull::NotReady => {
                    self.position += 1;
                }
                Pull::Exhausted => {
                    let cursor = self.remove_current();
                    info!(source = %cursor.label(), live = self.cursors.len(), "Source exhausted");
                }
                Pull::Failed(e) => {
                    let cursor = self.remove_current();
                    warn!(source = %cursor.label(), error = %e, live = self.cursors.len(), "Source dropped");
                    return Some(Err(e));
                }
            }
        }
    }

    fn remove_current(&mut self) -> C {
        if self.position < self.prefetched.len() {
            self.prefetched.remove(self.position);
        }
        self.cursors.remove(self.position)
    }
}
