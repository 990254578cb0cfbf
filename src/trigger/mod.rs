//! Finds items ready for the next workflow step.
//!
//! The index answers a loose translation of the trigger query; every
//! candidate is then re-read from the repository and re-checked exactly,
//! because the index may lag. Only items passing the exact check reach
//! the caller.

pub mod matcher;

use opentelemetry::KeyValue;
use tracing::debug;

use crate::error::Result;
use crate::index::{Candidates, Hydration, IndexQuery, IndexSearch};
use crate::model::{Item, TriggerQuery};
use crate::telemetry::metrics;

pub use matcher::{collapse_newest, matches};

/// Trigger-query evaluation over the index and the repository.
#[derive(Clone)]
pub struct EventTrigger {
    search: IndexSearch,
}

impl EventTrigger {
    pub fn new(search: IndexSearch) -> Self {
        Self { search }
    }

    /// Items satisfying `query` against authoritative data, lazily.
    ///
    /// With `details = false` the yielded items carry no event details.
    pub fn find_eligible_items(&self, query: &TriggerQuery, details: bool) -> EligibleItems {
        let candidates = if query.excludes_everything() {
            self.search.nothing()
        } else {
            self.search
                .candidates(&IndexQuery::from_trigger(query), Hydration::Authoritative)
        };
        EligibleItems {
            candidates,
            query: query.clone(),
            details,
        }
    }

    /// Raw index results for `query`, without the exact re-check.
    ///
    /// May include items that no longer qualify. Hydrated from the index
    /// summary unless `details` asks for full repository reads.
    pub fn search_candidates(&self, query: &TriggerQuery, details: bool) -> Candidates {
        if query.excludes_everything() {
            return self.search.nothing();
        }
        let hydration = if details {
            Hydration::Authoritative
        } else {
            Hydration::Summary
        };
        self.search
            .candidates(&IndexQuery::from_trigger(query), hydration)
    }
}

/// Forward-only sequence of eligible items.
pub struct EligibleItems {
    candidates: Candidates,
    query: TriggerQuery,
    details: bool,
}

impl EligibleItems {
    pub async fn next(&mut self) -> Result<Option<Item>> {
        while let Some(item) = self.candidates.next().await? {
            if matches(&item, &self.query) {
                metrics::trigger_candidates().add(1, &[KeyValue::new("result", "matched")]);
                return Ok(Some(if self.details { item } else { item.summary() }));
            }
            metrics::trigger_candidates().add(1, &[KeyValue::new("result", "rejected")]);
            debug!(item = %item.key, "index candidate fails exact check, skipping");
        }
        Ok(None)
    }

    pub async fn collect(mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Index round trips made so far.
    pub fn pages_fetched(&self) -> u32 {
        self.candidates.pages_fetched()
    }
}
