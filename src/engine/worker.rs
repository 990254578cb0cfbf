//! Runs one component on one item and records the outcome in the item's
//! log. Never fails: component errors and panics become failure events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};

use super::control::WorkerControl;
use crate::component::{WorkComponent, WorkResult};
use crate::eventlog::{EventLogUpdater, LogTransform, RetryPolicy};
use crate::model::{Event, EventOutcome, Item, ItemKey, VersionMarker};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, start_work_span};

/// What happened to a run's result at the persistence checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    /// Appended; the log's new marker.
    Persisted(VersionMarker),
    /// The component asked not to record this run.
    NotPreservable,
    /// The worker was stopped before persisting.
    Stopped,
    /// Appending failed; the run is not recorded.
    Failed(String),
}

/// Outcome of one worker run.
#[derive(Debug, Clone)]
pub struct WorkReport {
    pub item: ItemKey,
    pub result: WorkResult,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub persistence: Persistence,
}

/// Decorates a component with timing, failure capture and persistence.
#[derive(Clone)]
pub struct Worker {
    component: Arc<dyn WorkComponent>,
    updater: EventLogUpdater,
    retry: RetryPolicy,
    control: WorkerControl,
}

impl Worker {
    pub fn new(
        component: Arc<dyn WorkComponent>,
        updater: EventLogUpdater,
        retry: RetryPolicy,
        control: WorkerControl,
    ) -> Self {
        Self {
            component,
            updater,
            retry,
            control,
        }
    }

    pub async fn run(&self, item: Item) -> WorkReport {
        let span = start_work_span(self.component.name(), &item.key);
        self.run_inner(item, span.clone()).instrument(span).await
    }

    async fn run_inner(&self, item: Item, span: tracing::Span) -> WorkReport {
        let key = item.key.clone();
        let started_at = Utc::now();
        let start = Instant::now();

        let result = self.execute(item).await;
        let duration = start.elapsed();

        record_outcome(&span, result.success);
        metrics::work_executed().add(
            1,
            &[
                KeyValue::new("component", self.component.name().to_string()),
                KeyValue::new("outcome", if result.success { "success" } else { "failure" }),
            ],
        );
        metrics::operation_duration_ms().record(
            duration.as_secs_f64() * 1000.0,
            &[KeyValue::new("operation", "work.execute")],
        );

        let persistence = if result.preservable {
            self.persist(&key, started_at, &result).await
        } else {
            info!(item = %key, "result not marked preservable, not recording it");
            Persistence::NotPreservable
        };

        WorkReport {
            item: key,
            result,
            started_at,
            duration,
            persistence,
        }
    }

    /// Run the component in its own task so a panic is contained.
    async fn execute(&self, item: Item) -> WorkResult {
        let component = Arc::clone(&self.component);
        let handle = tokio::spawn(async move { component.run(&item).await });

        match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(component = self.component.name(), error = %e, "component failed");
                WorkResult::failure(format!(
                    "component {} failed: {e:#}",
                    self.component.agent()
                ))
            }
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(component = self.component.name(), %message, "component panicked");
                WorkResult::failure(format!(
                    "component {} panicked: {message}",
                    self.component.agent()
                ))
            }
            Err(join) => WorkResult::failure(format!(
                "component {} was cancelled: {join}",
                self.component.agent()
            )),
        }
    }

    async fn persist(
        &self,
        key: &ItemKey,
        started_at: DateTime<Utc>,
        result: &WorkResult,
    ) -> Persistence {
        if !self.control.checkpoint().await {
            warn!(item = %key, "worker stopped, result will not be recorded");
            return Persistence::Stopped;
        }

        let event = Event::new(
            self.component.event_id(),
            started_at,
            EventOutcome::from_success(result.success),
            self.component.agent(),
        )
        .with_details(result.detail.clone());

        match self
            .updater
            .apply_update(key, &LogTransform::Append(event), self.retry)
            .await
        {
            Ok(update) => match update.version {
                Some(version) => {
                    metrics::events_appended().add(
                        1,
                        &[
                            KeyValue::new("event_id", self.component.event_id().to_string()),
                            KeyValue::new(
                                "outcome",
                                EventOutcome::from_success(result.success).to_string(),
                            ),
                        ],
                    );
                    Persistence::Persisted(version)
                }
                None => Persistence::Failed("append wrote nothing".to_string()),
            },
            Err(e) => {
                error!(item = %key, error = %e, "failed to record work result");
                Persistence::Failed(e.to_string())
            }
        }
    }
}
