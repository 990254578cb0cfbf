//! Span helpers for work execution and event log updates.

use tracing::Span;

use crate::model::ItemKey;

/// Start a span for one component run on one item.
///
/// The `work.outcome` field is declared empty and filled by
/// [`record_outcome`].
pub fn start_work_span(component: &str, item: &ItemKey) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.component" = component,
        "item.key" = %item,
        "work.outcome" = tracing::field::Empty,
    )
}

/// Record the outcome of a work run on its span.
pub fn record_outcome(span: &Span, success: bool) {
    span.record("work.outcome", if success { "success" } else { "failure" });
}

/// Start a span for an optimistic log update.
pub fn start_update_span(operation: &str, item: &ItemKey) -> Span {
    tracing::info_span!(
        "log.update",
        "log.operation" = operation,
        "item.key" = %item,
    )
}
