//! In-process index. Holds whatever snapshot it was last fed, so tests can
//! make it lag the repository on purpose.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use super::query::{Clause, FAIL_EVENT, ITEM_KEY, ITEM_TYPE, IndexQuery, SUCCESS_EVENT};
use super::{IndexHit, IndexPage, ItemIndex, PageCursor};
use crate::error::{Error, Result};
use crate::model::{Item, ItemKey};

/// Indexed projection of one item.
#[derive(Debug, Clone)]
struct IndexDocument {
    item_type: Option<String>,
    success_events: BTreeSet<String>,
    fail_events: BTreeSet<String>,
    summary: Item,
}

impl IndexDocument {
    fn from_item(item: &Item) -> Self {
        let mut success_events = BTreeSet::new();
        let mut fail_events = BTreeSet::new();
        for event in &item.events {
            if event.is_success() {
                success_events.insert(event.event_id.clone());
            } else {
                fail_events.insert(event.event_id.clone());
            }
        }
        Self {
            item_type: item.item_type.clone(),
            success_events,
            fail_events,
            summary: item.summary(),
        }
    }

    fn contains(&self, key: &ItemKey, field: &str, value: &str) -> bool {
        match field {
            SUCCESS_EVENT => self.success_events.contains(value),
            FAIL_EVENT => self.fail_events.contains(value),
            ITEM_TYPE => self.item_type.as_deref() == Some(value),
            ITEM_KEY => key.as_str() == value,
            _ => false,
        }
    }

    fn matches(&self, key: &ItemKey, query: &IndexQuery) -> bool {
        query.clauses.iter().all(|clause| match clause {
            Clause::Require { field, value } => self.contains(key, field, value),
            Clause::Exclude { field, value } => !self.contains(key, field, value),
            Clause::AnyOf { field, values } => {
                values.iter().any(|v| self.contains(key, field, v))
            }
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    documents: Mutex<BTreeMap<ItemKey, IndexDocument>>,
    searches: AtomicU32,
    /// Searches allowed before every further one fails.
    fail_after: Mutex<Option<u32>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index (or re-index) an item as it looks right now.
    pub fn index_item(&self, item: &Item) {
        self.lock_documents()
            .insert(item.key.clone(), IndexDocument::from_item(item));
    }

    pub fn remove_item(&self, key: &ItemKey) {
        self.lock_documents().remove(key);
    }

    /// Number of search round trips served.
    pub fn searches(&self) -> u32 {
        self.searches.load(Ordering::SeqCst)
    }

    /// Let `n` more searches succeed, then fail every later one.
    pub fn fail_after(&self, n: u32) {
        *self
            .fail_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(self.searches() + n);
    }

    fn lock_documents(&self) -> std::sync::MutexGuard<'_, BTreeMap<ItemKey, IndexDocument>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ItemIndex for InMemoryIndex {
    async fn search(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<IndexPage> {
        let served = self.searches.fetch_add(1, Ordering::SeqCst);
        let limit = *self
            .fail_after
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if limit.is_some_and(|limit| served >= limit) {
            return Err(Error::Communication("index unavailable".to_string()));
        }

        let query: IndexQuery = query.parse()?;
        let page_size = page_size.max(1);
        let lower = match cursor {
            Some(PageCursor(after)) => Bound::Excluded(ItemKey(after.clone())),
            None => Bound::Unbounded,
        };

        let documents = self.lock_documents();
        let mut matching = documents
            .range((lower, Bound::Unbounded))
            .filter(|(key, doc)| doc.matches(key, &query));

        let hits: Vec<IndexHit> = matching
            .by_ref()
            .take(page_size)
            .map(|(key, doc)| IndexHit {
                key: key.clone(),
                summary: Some(doc.summary.clone()),
            })
            .collect();

        let next = match (hits.last(), matching.next()) {
            (Some(last), Some(_)) => Some(PageCursor(last.key.0.clone())),
            _ => None,
        };

        Ok(IndexPage { hits, next })
    }
}
