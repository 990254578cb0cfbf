//! Declarative eligibility criteria over an item's event history.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::item::ItemKey;

/// Which items are ready for the next workflow step.
///
/// All criteria are conjunctive. Event ids are judged by their newest
/// occurrence in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerQuery {
    /// Newest occurrence must be a success.
    pub required_success: BTreeSet<String>,

    /// Newest occurrence must be a failure.
    pub required_failure: BTreeSet<String>,

    /// Absent, or newest occurrence not after the item's last-modified marker.
    pub stale_or_absent: BTreeSet<String>,

    /// Must not occur at all, whatever the outcome.
    pub forbidden: BTreeSet<String>,

    /// Restrict to one item kind.
    pub item_type: Option<String>,

    /// Restrict to these items. `Some(empty)` matches nothing.
    #[serde(skip)]
    pub candidates: Option<BTreeSet<ItemKey>>,
}

impl TriggerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(mut self, event_id: impl Into<String>) -> Self {
        self.required_success.insert(event_id.into());
        self
    }

    pub fn failure(mut self, event_id: impl Into<String>) -> Self {
        self.required_failure.insert(event_id.into());
        self
    }

    pub fn stale(mut self, event_id: impl Into<String>) -> Self {
        self.stale_or_absent.insert(event_id.into());
        self
    }

    pub fn forbid(mut self, event_id: impl Into<String>) -> Self {
        self.forbidden.insert(event_id.into());
        self
    }

    pub fn item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn candidates<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ItemKey>,
    {
        self.candidates = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// True when an explicit, empty candidate set rules out every item.
    pub fn excludes_everything(&self) -> bool {
        self.candidates.as_ref().is_some_and(|c| c.is_empty())
    }
}
