//! Pure transforms from one event sequence to the next.
//!
//! None of these touch the repository; [`super::update::EventLogUpdater`]
//! applies them under optimistic concurrency.

use crate::model::{Event, EventOutcome};

/// New event sequence plus how many entries were removed and added.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub events: Vec<Event>,
    pub removed: usize,
    pub added: usize,
}

impl Rewrite {
    fn unchanged(events: &[Event]) -> Self {
        Self {
            events: events.to_vec(),
            removed: 0,
            added: 0,
        }
    }

    /// Entries removed or added.
    pub fn affected(&self) -> usize {
        self.removed + self.added
    }

    pub fn is_noop(&self) -> bool {
        self.affected() == 0
    }

    /// Removes entries, so the previous log is worth a backup.
    pub fn is_destructive(&self) -> bool {
        self.removed > 0
    }
}

/// Drop the earliest entry with `event_id` and everything after it.
pub fn restart_from_event(events: &[Event], event_id: &str) -> Rewrite {
    truncate_at(events, events.iter().position(|e| e.event_id == event_id))
}

/// Drop the earliest failure and everything after it.
pub fn restart_from_first_failure(events: &[Event]) -> Rewrite {
    truncate_at(
        events,
        events
            .iter()
            .position(|e| e.outcome == EventOutcome::Failure),
    )
}

fn truncate_at(events: &[Event], cut: Option<usize>) -> Rewrite {
    match cut {
        Some(cut) => Rewrite {
            events: events[..cut].to_vec(),
            removed: events.len() - cut,
            added: 0,
        },
        None => Rewrite::unchanged(events),
    }
}

pub fn append(events: &[Event], event: Event) -> Rewrite {
    let mut next = Vec::with_capacity(events.len() + 1);
    next.extend_from_slice(events);
    next.push(event);
    Rewrite {
        events: next,
        removed: 0,
        added: 1,
    }
}

pub fn prepend(events: &[Event], event: Event) -> Rewrite {
    let mut next = Vec::with_capacity(events.len() + 1);
    next.push(event);
    next.extend_from_slice(events);
    Rewrite {
        events: next,
        removed: 0,
        added: 1,
    }
}

/// Drop every entry with `event_id`, wherever it sits.
pub fn remove_all_of_type(events: &[Event], event_id: &str) -> Rewrite {
    let kept: Vec<Event> = events
        .iter()
        .filter(|e| e.event_id != event_id)
        .cloned()
        .collect();
    Rewrite {
        removed: events.len() - kept.len(),
        events: kept,
        added: 0,
    }
}

/// A named rewrite, so the update driver can log and re-run it per attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LogTransform {
    RestartFromEvent(String),
    RestartFromFirstFailure,
    Append(Event),
    Prepend(Event),
    RemoveAllOfType(String),
}

impl LogTransform {
    pub fn apply(&self, events: &[Event]) -> Rewrite {
        match self {
            LogTransform::RestartFromEvent(id) => restart_from_event(events, id),
            LogTransform::RestartFromFirstFailure => restart_from_first_failure(events),
            LogTransform::Append(event) => append(events, event.clone()),
            LogTransform::Prepend(event) => prepend(events, event.clone()),
            LogTransform::RemoveAllOfType(id) => remove_all_of_type(events, id),
        }
    }

    /// Short operation name for spans and metrics.
    pub fn operation(&self) -> &'static str {
        match self {
            LogTransform::RestartFromEvent(_) => "restart_from_event",
            LogTransform::RestartFromFirstFailure => "restart_from_first_failure",
            LogTransform::Append(_) => "append",
            LogTransform::Prepend(_) => "prepend",
            LogTransform::RemoveAllOfType(_) => "remove_all_of_type",
        }
    }
}

impl std::fmt::Display for LogTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTransform::RestartFromEvent(id) => write!(f, "restart from {id}"),
            LogTransform::RestartFromFirstFailure => write!(f, "restart from first failure"),
            LogTransform::Append(e) => write!(f, "append {} ({})", e.event_id, e.outcome),
            LogTransform::Prepend(e) => write!(f, "prepend {} ({})", e.event_id, e.outcome),
            LogTransform::RemoveAllOfType(id) => write!(f, "remove all {id}"),
        }
    }
}
