use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use super::event::Event;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque repository key of an item (e.g. `uuid:1b0e...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(pub String);

impl ItemKey {
    /// A fresh repository key.
    pub fn generate() -> Self {
        Self(format!("uuid:{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Version marker
// ---------------------------------------------------------------------------

/// Generation token of an item's log: the object's last-modified time.
///
/// A conditional write only succeeds when the marker it presents equals the
/// stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMarker(pub DateTime<Utc>);

impl VersionMarker {
    /// Marker for a write happening now. Microsecond precision, strictly
    /// after `self`.
    pub fn next(&self) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        let bumped = self.0.trunc_subsecs(6) + chrono::Duration::microseconds(1);
        Self(now.max(bumped))
    }

    pub fn initial() -> Self {
        Self(Utc::now().trunc_subsecs(6))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Snapshot of an item and its event log as read from the repository
/// (authoritative) or hydrated from the index (possibly stale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,

    /// Identifier in the producer's namespace, e.g. "B400022028241-RT1".
    pub external_id: Option<String>,

    /// Item kind, e.g. "batch" or "edition". None when unknown.
    pub item_type: Option<String>,

    /// Ordered by write order.
    pub events: Vec<Event>,

    pub last_modified: VersionMarker,
}

impl Item {
    /// Copy with every event's details removed.
    pub fn summary(&self) -> Self {
        Self {
            events: self.events.iter().map(Event::summary).collect(),
            ..self.clone()
        }
    }

    /// Newest occurrence of `event_id`, if any.
    pub fn newest_event(&self, event_id: &str) -> Option<&Event> {
        crate::trigger::matcher::collapse_newest(&self.events)
            .remove(event_id)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Registration request for a new item.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub(crate) external_id: String,
    pub(crate) item_type: Option<String>,
    pub(crate) initial_events: Vec<Event>,
}

impl NewItem {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            item_type: None,
            initial_events: Vec::new(),
        }
    }

    pub fn item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    /// Seed the log, e.g. with a "batch received" bootstrap event.
    pub fn event(mut self, event: Event) -> Self {
        self.initial_events.push(event);
        self
    }

    pub fn external_id(&self) -> &str {
        &self.external_id
    }
}
