//! The authoritative object repository holding each item's event log.
//!
//! Implementations provide compare-and-swap on the log's version marker;
//! that primitive is the only synchronization between concurrent writers.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Event, Item, ItemKey, NewItem, VersionMarker};

/// Repository contract consumed by the update driver and the trigger.
///
/// Failure modes: `NotFound` for unknown items, `VersionConflict` when a
/// conditional write presents a stale marker, and communication errors.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Read an item's current log and version marker.
    async fn read_item(&self, key: &ItemKey) -> Result<Item>;

    /// Replace the log if `expected` is still the current marker.
    ///
    /// Returns the new marker, or `Error::VersionConflict` when another
    /// writer got there first. A rejected write leaves the item unchanged.
    async fn write_events_if_version_matches(
        &self,
        key: &ItemKey,
        events: &[Event],
        expected: &VersionMarker,
    ) -> Result<VersionMarker>;

    /// Resolve an external identifier to the repository key.
    async fn find_key_by_external_id(&self, external_id: &str) -> Result<ItemKey>;

    /// Keep a copy of a log generation that is about to be rewritten.
    async fn backup_events(
        &self,
        key: &ItemKey,
        events: &[Event],
        version: &VersionMarker,
    ) -> Result<()>;

    /// Create an item. Registering an existing external id returns the
    /// existing item untouched.
    async fn create_item(&self, new: NewItem) -> Result<Item>;
}
