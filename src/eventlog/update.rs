//! Read → transform → conditional write → retry on conflict.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use super::rewrite::LogTransform;
use crate::error::{Error, Result};
use crate::model::{ItemKey, VersionMarker};
use crate::repository::EventRepository;
use crate::telemetry::{metrics, work::start_update_span};

/// Bound on conditional-write attempts and the fixed pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Result of a successful (or unnecessary) update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Entries removed or added.
    pub affected: usize,
    /// Marker after the write; `None` when the transform was a no-op and
    /// nothing was written.
    pub version: Option<VersionMarker>,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Applies log transforms to repository-backed items under concurrent
/// writers. Holds no locks: correctness rests on the repository's
/// compare-and-swap.
#[derive(Clone)]
pub struct EventLogUpdater {
    repo: Arc<dyn EventRepository>,
}

impl EventLogUpdater {
    pub fn new(repo: Arc<dyn EventRepository>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<dyn EventRepository> {
        &self.repo
    }

    /// Apply `transform` to the item's log.
    ///
    /// # Errors
    ///
    /// `ConcurrencyExhausted` when every attempt lost its race (the item is
    /// unchanged), `NotFound` for an unknown item, and communication errors
    /// from the repository, all surfaced without further retry.
    pub async fn apply_update(
        &self,
        key: &ItemKey,
        transform: &LogTransform,
        policy: RetryPolicy,
    ) -> Result<UpdateOutcome> {
        let span = start_update_span(transform.operation(), key);
        let start = Instant::now();
        let result = self
            .apply_update_inner(key, transform, policy)
            .instrument(span)
            .await;

        let verdict = match &result {
            Ok(outcome) if outcome.version.is_none() => "noop",
            Ok(_) => "ok",
            Err(Error::ConcurrencyExhausted { .. }) => "exhausted",
            Err(_) => "error",
        };
        metrics::log_updates().add(
            1,
            &[
                KeyValue::new("operation", transform.operation()),
                KeyValue::new("result", verdict),
            ],
        );
        metrics::operation_duration_ms().record(
            start.elapsed().as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "log.update")],
        );
        result
    }

    async fn apply_update_inner(
        &self,
        key: &ItemKey,
        transform: &LogTransform,
        policy: RetryPolicy,
    ) -> Result<UpdateOutcome> {
        let max_attempts = policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let item = self.repo.read_item(key).await?;
            let rewrite = transform.apply(&item.events);

            if rewrite.is_noop() && rewrite.events == item.events {
                debug!(item = %key, %transform, "nothing to change");
                return Ok(UpdateOutcome {
                    affected: 0,
                    version: None,
                    attempts: attempt,
                });
            }

            if rewrite.is_destructive() {
                if let Err(e) = self
                    .repo
                    .backup_events(key, &item.events, &item.last_modified)
                    .await
                {
                    warn!(item = %key, error = %e, "backup of event log failed, continuing");
                }
            }

            match self
                .repo
                .write_events_if_version_matches(key, &rewrite.events, &item.last_modified)
                .await
            {
                Ok(version) => {
                    if rewrite.removed > 0 {
                        metrics::events_removed().add(
                            rewrite.removed as u64,
                            &[KeyValue::new("operation", transform.operation())],
                        );
                    }
                    info!(
                        item = %key,
                        %transform,
                        removed = rewrite.removed,
                        added = rewrite.added,
                        attempt,
                        "event log updated"
                    );
                    return Ok(UpdateOutcome {
                        affected: rewrite.affected(),
                        version: Some(version),
                        attempts: attempt,
                    });
                }
                Err(Error::VersionConflict(_)) => {
                    metrics::cas_conflicts()
                        .add(1, &[KeyValue::new("operation", transform.operation())]);
                    warn!(
                        item = %key,
                        attempt,
                        max_attempts,
                        "event log changed since read, retrying"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(policy.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::ConcurrencyExhausted {
            key: key.to_string(),
            attempts: max_attempts,
        })
    }
}
