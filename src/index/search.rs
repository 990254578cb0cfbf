//! Lazy, page-at-a-time candidate sequence over the index.

use std::collections::VecDeque;
use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{debug, warn};

use super::{IndexHit, IndexQuery, ItemIndex, PageCursor};
use crate::error::{Error, Result};
use crate::model::Item;
use crate::repository::EventRepository;
use crate::telemetry::metrics;

/// Where candidate items get their event history from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// The summary stored in the index. Cheap, possibly stale, no details.
    Summary,
    /// One repository read per candidate. Current and complete.
    Authoritative,
}

/// Issues index queries and hands out forward-only candidate cursors.
#[derive(Clone)]
pub struct IndexSearch {
    index: Arc<dyn ItemIndex>,
    repo: Arc<dyn EventRepository>,
    page_size: usize,
}

impl IndexSearch {
    pub fn new(
        index: Arc<dyn ItemIndex>,
        repo: Arc<dyn EventRepository>,
        page_size: usize,
    ) -> Self {
        Self {
            index,
            repo,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Cursor over every item the index returns for `query`. Nothing is
    /// fetched until the first call to [`Candidates::next`].
    pub fn candidates(&self, query: &IndexQuery, hydration: Hydration) -> Candidates {
        Candidates {
            index: Arc::clone(&self.index),
            repo: Arc::clone(&self.repo),
            query: query.to_string(),
            page_size: self.page_size,
            hydration,
            buffer: VecDeque::new(),
            cursor: None,
            done: false,
            pages: 0,
        }
    }

    /// A cursor that yields nothing and never touches the index.
    pub fn nothing(&self) -> Candidates {
        let mut candidates = self.candidates(&IndexQuery::default(), Hydration::Summary);
        candidates.done = true;
        candidates
    }
}

/// Forward-only sequence of candidate items, fetched one page per round
/// trip. Not restartable once consumed; after an error it yields nothing
/// more, but items already returned remain valid.
pub struct Candidates {
    index: Arc<dyn ItemIndex>,
    repo: Arc<dyn EventRepository>,
    query: String,
    page_size: usize,
    hydration: Hydration,
    buffer: VecDeque<IndexHit>,
    cursor: Option<PageCursor>,
    done: bool,
    pages: u32,
}

impl Candidates {
    /// The next candidate, or `None` once the result set is exhausted.
    pub async fn next(&mut self) -> Result<Option<Item>> {
        loop {
            if let Some(hit) = self.buffer.pop_front() {
                match self.hydrate(hit).await {
                    Ok(Some(item)) => return Ok(Some(item)),
                    Ok(None) => continue,
                    Err(e) => return Err(self.abort(e)),
                }
            }
            if self.done {
                return Ok(None);
            }
            if let Err(e) = self.fetch_page().await {
                return Err(self.abort(e));
            }
        }
    }

    /// Drain the remaining candidates into memory.
    pub async fn collect(mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Index round trips made so far.
    pub fn pages_fetched(&self) -> u32 {
        self.pages
    }

    /// The query string sent to the index.
    pub fn query(&self) -> &str {
        &self.query
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let page = self
            .index
            .search(&self.query, self.page_size, self.cursor.as_ref())
            .await?;
        self.pages += 1;
        metrics::index_pages().add(1, &[]);
        debug!(
            query = %self.query,
            page = self.pages,
            hits = page.hits.len(),
            "fetched index page"
        );

        self.buffer.extend(page.hits);
        match page.next {
            Some(next) => self.cursor = Some(next),
            None => self.done = true,
        }
        Ok(())
    }

    async fn hydrate(&self, hit: IndexHit) -> Result<Option<Item>> {
        if self.hydration == Hydration::Summary {
            if let Some(summary) = hit.summary {
                return Ok(Some(summary));
            }
        }
        match self.repo.read_item(&hit.key).await {
            Ok(item) => Ok(Some(item)),
            Err(Error::NotFound(_)) => {
                metrics::trigger_candidates().add(1, &[KeyValue::new("result", "missing")]);
                debug!(item = %hit.key, "indexed item no longer in repository, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn abort(&mut self, error: Error) -> Error {
        warn!(query = %self.query, error = %error, "candidate iteration aborted");
        self.done = true;
        self.buffer.clear();
        error
    }
}
