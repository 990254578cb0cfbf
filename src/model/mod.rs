//! Core data model.
//!
//! An item is a unit of work (typically one delivery batch) with an ordered,
//! append-only log of events. The log lives in the repository; everything
//! here is a value snapshot of it.

pub mod event;
pub mod item;
pub mod query;

pub use event::{Event, EventOutcome};
pub use item::{Item, ItemKey, NewItem, VersionMarker};
pub use query::TriggerQuery;
