//! Worker control and the dispatch loop.
//!
//! The dispatcher polls for items eligible for one component, hands each to
//! a [`Worker`] and keeps at most `max_concurrent` runs in flight. A
//! [`WorkerControl`] lets an operator pause, resume or stop persistence
//! across every worker sharing it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::worker::{WorkReport, Worker};
use crate::client::EventClient;
use crate::component::WorkComponent;
use crate::error::Result;
use crate::model::{ItemKey, TriggerQuery};

/// Lifecycle state shared by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

/// Pause/resume/stop handle. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct WorkerControl {
    state: Arc<watch::Sender<RunState>>,
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Running);
        Self { state: Arc::new(tx) }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn pause(&self) {
        self.transition(RunState::Paused);
    }

    /// Resume after a pause. Has no effect once stopped.
    pub fn resume(&self) {
        self.transition(RunState::Running);
    }

    /// Stop for good; waiting checkpoints return `false`.
    pub fn stop(&self) {
        self.state.send_replace(RunState::Stopped);
        info!("workers stopped");
    }

    fn transition(&self, to: RunState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == RunState::Stopped || *current == to {
                return false;
            }
            *current = to;
            true
        });
        if changed {
            info!(state = ?to, "worker state changed");
        }
    }

    /// Wait while paused. Returns `true` if work may proceed, `false` if
    /// stopped.
    pub async fn checkpoint(&self) -> bool {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|s| *s != RunState::Paused).await {
            Ok(state) => *state == RunState::Running,
            Err(_) => false,
        }
    }
}

/// Dispatch loop settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Interval between eligibility queries.
    pub poll_interval: Duration,
    /// Upper bound on concurrent worker runs.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_concurrent: 4,
        }
    }
}

/// Feeds eligible items to one component until shut down.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<EventClient>,
    component: Arc<dyn WorkComponent>,
    trigger: TriggerQuery,
    config: DispatchConfig,
    control: WorkerControl,
    shutdown: Arc<Notify>,
    slots: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<ItemKey>>>,
}

impl Dispatcher {
    pub fn new(
        client: Arc<EventClient>,
        component: Arc<dyn WorkComponent>,
        trigger: TriggerQuery,
        config: DispatchConfig,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            client,
            component,
            trigger,
            config,
            control: WorkerControl::new(),
            shutdown: Arc::new(Notify::new()),
            slots,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Handle shared with every worker this dispatcher starts.
    pub fn control(&self) -> &WorkerControl {
        &self.control
    }

    /// Signal the loop to exit after in-flight runs finish.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run until shutdown or stop.
    pub async fn run(&self) -> Result<()> {
        let mut workers: JoinSet<WorkReport> = JoinSet::new();
        let mut tick =
            tokio::time::interval(self.config.poll_interval.max(Duration::from_millis(1)));

        info!(
            component = self.component.name(),
            max_concurrent = self.config.max_concurrent,
            "dispatcher started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!(component = self.component.name(), "dispatcher shutting down");
                    break;
                }
                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    self.finish(joined);
                }
                _ = tick.tick() => {
                    match self.control.state() {
                        RunState::Stopped => break,
                        RunState::Paused => debug!("paused, skipping dispatch round"),
                        RunState::Running => {
                            if let Err(e) = self.dispatch_round(&mut workers).await {
                                error!(component = self.component.name(), "dispatch round failed: {e}");
                            }
                        }
                    }
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            self.finish(joined);
        }
        Ok(())
    }

    /// One eligibility query; wait for every run it starts.
    pub async fn run_once(&self) -> Result<Vec<WorkReport>> {
        let mut workers = JoinSet::new();
        self.dispatch_round(&mut workers).await?;

        let mut reports = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Some(report) = self.finish(joined) {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Start workers for eligible items while slots are free.
    async fn dispatch_round(&self, workers: &mut JoinSet<WorkReport>) -> Result<usize> {
        if self.slots.available_permits() == 0 {
            return Ok(0);
        }

        let mut eligible = self.client.find_eligible_items(&self.trigger, true);
        let mut started = 0;

        while let Some(item) = eligible.next().await? {
            if !self.claim(&item.key) {
                continue;
            }
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                self.release(&item.key);
                break;
            };

            let worker = Worker::new(
                Arc::clone(&self.component),
                self.client.updater().clone(),
                self.client.settings().retry,
                self.control.clone(),
            );
            debug!(item = %item.key, component = self.component.name(), "dispatching");
            workers.spawn(async move {
                let report = worker.run(item).await;
                drop(permit);
                report
            });
            started += 1;

            if self.slots.available_permits() == 0 {
                break;
            }
        }

        Ok(started)
    }

    fn claim(&self, key: &ItemKey) -> bool {
        match self.in_flight.lock() {
            Ok(mut set) => set.insert(key.clone()),
            Err(_) => false,
        }
    }

    fn release(&self, key: &ItemKey) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(key);
        }
    }

    fn finish(
        &self,
        joined: std::result::Result<WorkReport, tokio::task::JoinError>,
    ) -> Option<WorkReport> {
        match joined {
            Ok(report) => {
                self.release(&report.item);
                info!(
                    item = %report.item,
                    success = report.result.success,
                    persistence = ?report.persistence,
                    duration_ms = report.duration.as_millis() as u64,
                    "work finished"
                );
                Some(report)
            }
            Err(e) => {
                warn!("worker task failed: {e}");
                None
            }
        }
    }
}
