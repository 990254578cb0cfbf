//! Exact eligibility predicate over an item's event history.

use std::collections::HashMap;

use crate::model::{Event, Item, TriggerQuery};

/// Newest entry per event id.
///
/// The later timestamp wins; on equal timestamps the entry written later
/// wins, so the result does not depend on how ties were interleaved.
pub fn collapse_newest(events: &[Event]) -> HashMap<&str, &Event> {
    let mut newest: HashMap<&str, &Event> = HashMap::with_capacity(events.len());
    for event in events {
        match newest.get(event.event_id.as_str()) {
            Some(current) if current.timestamp > event.timestamp => {}
            _ => {
                newest.insert(event.event_id.as_str(), event);
            }
        }
    }
    newest
}

/// Does `item` satisfy every criterion of `query`?
///
/// Pure: depends only on the collapsed newest-per-id events, the item's
/// key, kind and last-modified marker.
pub fn matches(item: &Item, query: &TriggerQuery) -> bool {
    if let Some(ref candidates) = query.candidates {
        if !candidates.contains(&item.key) {
            return false;
        }
    }
    if let Some(ref wanted) = query.item_type {
        if item.item_type.as_ref() != Some(wanted) {
            return false;
        }
    }

    let newest = collapse_newest(&item.events);

    let success_ok = query
        .required_success
        .iter()
        .all(|id| newest.get(id.as_str()).is_some_and(|e| e.is_success()));

    let failure_ok = query
        .required_failure
        .iter()
        .all(|id| newest.get(id.as_str()).is_some_and(|e| !e.is_success()));

    let stale_ok = query.stale_or_absent.iter().all(|id| {
        newest
            .get(id.as_str())
            .is_none_or(|e| e.timestamp <= item.last_modified.timestamp())
    });

    let forbidden_ok = query
        .forbidden
        .iter()
        .all(|id| !newest.contains_key(id.as_str()));

    success_ok && failure_ok && stale_ok && forbidden_ok
}
