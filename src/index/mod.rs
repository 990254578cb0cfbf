//! The secondary, eventually-consistent search index over items.
//!
//! The index is a cache: it may lag the repository, is never written by
//! this crate, and is always subordinate to the repository in authority.

pub mod memory;
pub mod query;
pub mod search;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Item, ItemKey};

pub use query::{Clause, IndexQuery};
pub use search::{Candidates, Hydration, IndexSearch};

/// Opaque position in a result set, handed back to fetch the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(pub String);

/// One search hit.
#[derive(Debug, Clone)]
pub struct IndexHit {
    pub key: ItemKey,
    /// Details-free projection of the item as the index last saw it.
    pub summary: Option<Item>,
}

/// One page of hits and where to continue, if anywhere.
#[derive(Debug, Clone)]
pub struct IndexPage {
    pub hits: Vec<IndexHit>,
    pub next: Option<PageCursor>,
}

/// Paged search over the index. One call is one round trip.
#[async_trait]
pub trait ItemIndex: Send + Sync {
    /// Run `query` (see [`query`] for the syntax) and return the page
    /// starting at `cursor`, or the first page when `cursor` is `None`.
    async fn search(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<IndexPage>;
}
