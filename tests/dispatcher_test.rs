//! Dispatch loop over the in-memory adapters.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use itemflow::component::{WorkComponent, WorkResult};
use itemflow::engine::{DispatchConfig, Dispatcher, Persistence};
use itemflow::eventlog::RetryPolicy;
use itemflow::index::memory::InMemoryIndex;
use itemflow::model::{Event, Item, ItemKey, TriggerQuery, VersionMarker};
use itemflow::repository::memory::InMemoryRepository;
use itemflow::{ClientSettings, EventClient};

/// Sleeps briefly and tracks how many runs overlap.
#[derive(Default)]
struct SlowComponent {
    running: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

#[async_trait]
impl WorkComponent for SlowComponent {
    fn name(&self) -> &str {
        "metadata"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn event_id(&self) -> &str {
        "Metadata"
    }

    async fn run(&self, _item: &Item) -> anyhow::Result<WorkResult> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(WorkResult::success("metadata ok"))
    }
}

struct Fixture {
    repo: Arc<InMemoryRepository>,
    component: Arc<SlowComponent>,
    dispatcher: Dispatcher,
}

fn fixture(items: usize, max_concurrent: usize) -> Fixture {
    let repo = Arc::new(InMemoryRepository::new());
    let index = Arc::new(InMemoryIndex::new());
    for n in 0..items {
        let item = Item {
            key: ItemKey::from(format!("uuid:{n:02}")),
            external_id: Some(format!("RT{n}")),
            item_type: Some("batch".to_string()),
            events: vec![Event::success("Data_Received", Utc::now())],
            last_modified: VersionMarker::initial(),
        };
        repo.insert(item.clone());
        index.index_item(&item);
    }

    let client = Arc::new(EventClient::new(
        repo.clone(),
        index,
        ClientSettings {
            retry: RetryPolicy::new(5, Duration::from_millis(1)),
            page_size: 3,
        },
    ));
    let component = Arc::new(SlowComponent::default());
    let dispatcher = Dispatcher::new(
        client,
        component.clone(),
        TriggerQuery::new().success("Data_Received").forbid("Metadata"),
        DispatchConfig {
            poll_interval: Duration::from_millis(10),
            max_concurrent,
        },
    );
    Fixture {
        repo,
        component,
        dispatcher,
    }
}

fn processed(repo: &InMemoryRepository, items: usize) -> usize {
    (0..items)
        .filter(|n| {
            repo.get(&ItemKey::from(format!("uuid:{n:02}")))
                .is_some_and(|item| item.events.iter().any(|e| e.event_id == "Metadata"))
        })
        .count()
}

#[tokio::test]
async fn run_once_processes_every_eligible_item() {
    let fx = fixture(5, 10);

    let reports = fx.dispatcher.run_once().await.unwrap();

    assert_eq!(reports.len(), 5);
    assert!(
        reports
            .iter()
            .all(|r| matches!(r.persistence, Persistence::Persisted(_)))
    );
    assert_eq!(processed(&fx.repo, 5), 5);

    // The index still lags, but the exact check now rejects every item.
    let reports = fx.dispatcher.run_once().await.unwrap();
    assert!(reports.is_empty());
    assert_eq!(fx.component.runs.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn concurrency_is_bounded() {
    let fx = fixture(7, 2);

    let reports = fx.dispatcher.run_once().await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(fx.component.peak.load(Ordering::SeqCst) <= 2);

    let mut total = reports.len();
    while total < 7 {
        let reports = fx.dispatcher.run_once().await.unwrap();
        assert!(!reports.is_empty());
        total += reports.len();
    }
    assert_eq!(processed(&fx.repo, 7), 7);
    assert!(fx.component.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_loop_drains_work_and_shuts_down() {
    let fx = fixture(6, 2);

    let dispatcher = fx.dispatcher.clone();
    let handle = tokio::spawn(async move { dispatcher.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while processed(&fx.repo, 6) < 6 {
        assert!(tokio::time::Instant::now() < deadline, "items not processed in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fx.dispatcher.shutdown();
    handle.await.unwrap().unwrap();
    assert_eq!(fx.component.runs.load(Ordering::SeqCst), 6);
    assert!(fx.component.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn paused_dispatcher_starts_nothing() {
    let fx = fixture(3, 2);
    fx.dispatcher.control().pause();

    let dispatcher = fx.dispatcher.clone();
    let handle = tokio::spawn(async move { dispatcher.run().await });
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(fx.component.runs.load(Ordering::SeqCst), 0);

    fx.dispatcher.control().stop();
    handle.await.unwrap().unwrap();
    assert_eq!(processed(&fx.repo, 3), 0);
}
