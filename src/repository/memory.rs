//! In-process repository with the same compare-and-swap contract as the
//! Postgres one. Records conditional writes and can simulate racing writers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use super::EventRepository;
use crate::error::{Error, Result};
use crate::model::{Event, Item, ItemKey, NewItem, VersionMarker};

/// A log generation captured before a destructive rewrite.
#[derive(Debug, Clone)]
pub struct Backup {
    pub key: ItemKey,
    pub version: VersionMarker,
    pub events: Vec<Event>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    items: Mutex<HashMap<ItemKey, Item>>,
    backups: Mutex<Vec<Backup>>,
    conditional_writes: AtomicU32,
    injected_conflicts: AtomicU32,
    fail_backups: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an item as-is, replacing any item with the same key.
    pub fn insert(&self, item: Item) {
        self.lock_items().insert(item.key.clone(), item);
    }

    /// Current stored snapshot, bypassing the trait.
    pub fn get(&self, key: &ItemKey) -> Option<Item> {
        self.lock_items().get(key).cloned()
    }

    /// Number of conditional writes received, accepted or not.
    pub fn conditional_writes(&self) -> u32 {
        self.conditional_writes.load(Ordering::SeqCst)
    }

    /// Make the next `n` conditional writes lose a race: a concurrent
    /// writer bumps the marker just before each of them lands.
    pub fn inject_conflicts(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn fail_backups(&self, fail: bool) {
        self.fail_backups.store(fail, Ordering::SeqCst);
    }

    pub fn backups(&self) -> Vec<Backup> {
        self.backups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, HashMap<ItemKey, Item>> {
        self.items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventRepository for InMemoryRepository {
    async fn read_item(&self, key: &ItemKey) -> Result<Item> {
        self.lock_items()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("item {key}")))
    }

    async fn write_events_if_version_matches(
        &self,
        key: &ItemKey,
        events: &[Event],
        expected: &VersionMarker,
    ) -> Result<VersionMarker> {
        self.conditional_writes.fetch_add(1, Ordering::SeqCst);
        let mut items = self.lock_items();
        let item = items
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("item {key}")))?;

        if self.take_injected_conflict() {
            item.last_modified = item.last_modified.next();
        }

        if item.last_modified != *expected {
            return Err(Error::VersionConflict(key.to_string()));
        }

        let version = item.last_modified.next();
        item.events = events.to_vec();
        item.last_modified = version;
        Ok(version)
    }

    async fn find_key_by_external_id(&self, external_id: &str) -> Result<ItemKey> {
        self.lock_items()
            .values()
            .find(|item| item.external_id.as_deref() == Some(external_id))
            .map(|item| item.key.clone())
            .ok_or_else(|| Error::NotFound(format!("external id {external_id}")))
    }

    async fn backup_events(
        &self,
        key: &ItemKey,
        events: &[Event],
        version: &VersionMarker,
    ) -> Result<()> {
        if self.fail_backups.load(Ordering::SeqCst) {
            return Err(Error::Communication(format!("backup of {key} rejected")));
        }
        self.backups
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Backup {
                key: key.clone(),
                version: *version,
                events: events.to_vec(),
            });
        Ok(())
    }

    async fn create_item(&self, new: NewItem) -> Result<Item> {
        let mut items = self.lock_items();
        if let Some(existing) = items
            .values()
            .find(|item| item.external_id.as_deref() == Some(new.external_id.as_str()))
        {
            return Ok(existing.clone());
        }

        let item = Item {
            key: ItemKey::generate(),
            external_id: Some(new.external_id),
            item_type: new.item_type,
            events: new.initial_events,
            last_modified: VersionMarker::initial(),
        };
        items.insert(item.key.clone(), item.clone());
        Ok(item)
    }
}
