//! Entry point for schedulers and CLIs: event bookkeeping, workflow
//! restarts and eligibility queries over one repository and one index.
//!
//! Construct once at startup and share by `Arc`; the repository and index
//! clients are injected, never created lazily.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::info;

use crate::error::{Error, Result};
use crate::eventlog::{EventLogUpdater, LogTransform, RetryPolicy};
use crate::index::{Candidates, IndexSearch, ItemIndex};
use crate::model::{Event, EventOutcome, Item, ItemKey, NewItem, TriggerQuery, VersionMarker};
use crate::repository::EventRepository;
use crate::telemetry::metrics;
use crate::trigger::{EligibleItems, EventTrigger};

/// Defaults applied by [`EventClient`] operations that don't take them
/// explicitly.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub retry: RetryPolicy,
    pub page_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_size: 1000,
        }
    }
}

/// A new event to record on an item.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub agent: String,
    pub timestamp: DateTime<Utc>,
    pub details: String,
    pub event_id: String,
    pub outcome: EventOutcome,
}

impl EventRecord {
    fn into_event(self) -> Event {
        Event::new(self.event_id, self.timestamp, self.outcome, self.agent).with_details(self.details)
    }
}

#[derive(Clone)]
pub struct EventClient {
    repo: Arc<dyn EventRepository>,
    updater: EventLogUpdater,
    trigger: EventTrigger,
    settings: ClientSettings,
}

impl EventClient {
    pub fn new(
        repo: Arc<dyn EventRepository>,
        index: Arc<dyn ItemIndex>,
        settings: ClientSettings,
    ) -> Self {
        let search = IndexSearch::new(index, Arc::clone(&repo), settings.page_size);
        Self {
            updater: EventLogUpdater::new(Arc::clone(&repo)),
            trigger: EventTrigger::new(search),
            repo,
            settings,
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn updater(&self) -> &EventLogUpdater {
        &self.updater
    }

    // -----------------------------------------------------------------------
    // Items
    // -----------------------------------------------------------------------

    /// Register an item, or return the existing one for its external id.
    pub async fn register_item(&self, new: NewItem) -> Result<Item> {
        let item = self.repo.create_item(new).await?;
        info!(item = %item.key, external_id = ?item.external_id, "item registered");
        Ok(item)
    }

    /// Authoritative read of one item.
    pub async fn get_item(&self, key: &ItemKey) -> Result<Item> {
        self.repo.read_item(key).await
    }

    pub async fn find_item_by_external_id(&self, external_id: &str) -> Result<Item> {
        let key = self.repo.find_key_by_external_id(external_id).await?;
        self.repo.read_item(&key).await
    }

    /// Newest occurrence of `event_id` on the item.
    pub async fn get_event(&self, key: &ItemKey, event_id: &str) -> Result<Event> {
        let item = self.repo.read_item(key).await?;
        item.newest_event(event_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("event {event_id} on item {key}")))
    }

    // -----------------------------------------------------------------------
    // Event log
    // -----------------------------------------------------------------------

    /// Append an event; returns the log's new version marker.
    pub async fn append_event(&self, key: &ItemKey, record: EventRecord) -> Result<VersionMarker> {
        self.write_event(key, record.into_event(), false).await
    }

    /// Prepend an event, e.g. a synthetic bootstrap event.
    pub async fn prepend_event(&self, key: &ItemKey, record: EventRecord) -> Result<VersionMarker> {
        self.write_event(key, record.into_event(), true).await
    }

    async fn write_event(&self, key: &ItemKey, event: Event, at_head: bool) -> Result<VersionMarker> {
        let labels = [
            KeyValue::new("event_id", event.event_id.clone()),
            KeyValue::new("outcome", event.outcome.to_string()),
        ];
        let transform = if at_head {
            LogTransform::Prepend(event)
        } else {
            LogTransform::Append(event)
        };
        let update = self
            .updater
            .apply_update(key, &transform, self.settings.retry)
            .await?;
        metrics::events_appended().add(1, &labels);
        update
            .version
            .ok_or_else(|| Error::Other(format!("{transform} on {key} wrote nothing")))
    }

    /// Remove every occurrence of `event_id`; returns how many went.
    pub async fn remove_events(&self, key: &ItemKey, event_id: &str) -> Result<usize> {
        let update = self
            .updater
            .apply_update(
                key,
                &LogTransform::RemoveAllOfType(event_id.to_string()),
                self.settings.retry,
            )
            .await?;
        Ok(update.affected)
    }

    /// Truncate the log so the workflow re-runs from `from_event` (its
    /// earliest occurrence) or, when `None`, from the first failure.
    /// Returns the number of events removed.
    pub async fn trigger_workflow_restart(
        &self,
        key: &ItemKey,
        from_event: Option<&str>,
        policy: RetryPolicy,
    ) -> Result<usize> {
        let transform = match from_event {
            Some(id) => LogTransform::RestartFromEvent(id.to_string()),
            None => LogTransform::RestartFromFirstFailure,
        };
        let update = self.updater.apply_update(key, &transform, policy).await?;
        Ok(update.affected)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Items satisfying `query`, re-checked against the repository.
    pub fn find_eligible_items(&self, query: &TriggerQuery, details: bool) -> EligibleItems {
        self.trigger.find_eligible_items(query, details)
    }

    /// Unchecked index candidates for `query`.
    pub fn search_candidates(&self, query: &TriggerQuery, details: bool) -> Candidates {
        self.trigger.search_candidates(query, details)
    }
}
