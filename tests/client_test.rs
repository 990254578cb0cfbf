//! EventClient bookkeeping operations over the in-memory adapters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use itemflow::error::Error;
use itemflow::eventlog::RetryPolicy;
use itemflow::index::memory::InMemoryIndex;
use itemflow::model::{Event, EventOutcome, ItemKey, NewItem};
use itemflow::repository::memory::InMemoryRepository;
use itemflow::{ClientSettings, EventClient, EventRecord};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
}

fn client() -> (Arc<InMemoryRepository>, EventClient) {
    let repo = Arc::new(InMemoryRepository::new());
    let settings = ClientSettings {
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        page_size: 100,
    };
    let client = EventClient::new(repo.clone(), Arc::new(InMemoryIndex::new()), settings);
    (repo, client)
}

fn record(event_id: &str, minute: u32, outcome: EventOutcome) -> EventRecord {
    EventRecord {
        agent: "test-agent-1.0".to_string(),
        timestamp: at(minute),
        details: format!("{event_id} at {minute}"),
        event_id: event_id.to_string(),
        outcome,
    }
}

#[tokio::test]
async fn register_is_idempotent_per_external_id() {
    let (_, client) = client();

    let first = client
        .register_item(NewItem::new("B400022028241-RT1").item_type("batch"))
        .await
        .unwrap();
    let second = client
        .register_item(NewItem::new("B400022028241-RT1").item_type("edition"))
        .await
        .unwrap();

    assert_eq!(first.key, second.key);
    assert_eq!(second.item_type.as_deref(), Some("batch"));
    assert!(first.events.is_empty());
    assert!(first.key.as_str().starts_with("uuid:"));

    let found = client
        .find_item_by_external_id("B400022028241-RT1")
        .await
        .unwrap();
    assert_eq!(found.key, first.key);
}

#[tokio::test]
async fn unknown_items_are_not_found() {
    let (_, client) = client();

    let err = client.get_item(&ItemKey::from("uuid:nope")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let err = client.find_item_by_external_id("nope").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn append_and_prepend_record_full_events() {
    let (repo, client) = client();
    let item = client.register_item(NewItem::new("RT1")).await.unwrap();

    let v1 = client
        .append_event(&item.key, record("Data_Received", 1, EventOutcome::Success))
        .await
        .unwrap();
    let v2 = client
        .prepend_event(&item.key, record("Bootstrap", 0, EventOutcome::Success))
        .await
        .unwrap();
    assert!(v2 > v1);

    let stored = repo.get(&item.key).unwrap();
    assert_eq!(stored.last_modified, v2);
    let ids: Vec<&str> = stored.events.iter().map(|e| e.event_id.as_str()).collect();
    assert_eq!(ids, vec!["Bootstrap", "Data_Received"]);
    assert_eq!(stored.events[1].agent, "test-agent-1.0");
    assert_eq!(stored.events[1].details.as_deref(), Some("Data_Received at 1"));
}

#[tokio::test]
async fn get_event_returns_the_newest_occurrence() {
    let (_, client) = client();
    let item = client.register_item(NewItem::new("RT1")).await.unwrap();
    client
        .append_event(&item.key, record("Checksums", 5, EventOutcome::Success))
        .await
        .unwrap();
    client
        .append_event(&item.key, record("Checksums", 2, EventOutcome::Failure))
        .await
        .unwrap();

    let event = client.get_event(&item.key, "Checksums").await.unwrap();
    assert!(event.is_success());
    assert_eq!(event.timestamp, at(5));

    let err = client.get_event(&item.key, "Metadata").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn remove_events_reports_how_many_went() {
    let (repo, client) = client();
    let item = client
        .register_item(
            NewItem::new("RT1")
                .event(Event::failure("Checksums", at(1)))
                .event(Event::success("Metadata", at(2)))
                .event(Event::success("Checksums", at(3))),
        )
        .await
        .unwrap();

    let removed = client.remove_events(&item.key, "Checksums").await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(repo.get(&item.key).unwrap().events.len(), 1);

    let removed = client.remove_events(&item.key, "Checksums").await.unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn restart_from_event_or_first_failure() {
    let (repo, client) = client();
    let item = client
        .register_item(
            NewItem::new("RT1")
                .event(Event::success("Data_Received", at(1)))
                .event(Event::success("Checksums", at(2)))
                .event(Event::failure("Metadata", at(3)))
                .event(Event::success("Manual_QA", at(4))),
        )
        .await
        .unwrap();
    let policy = RetryPolicy::new(3, Duration::from_millis(1));

    let removed = client
        .trigger_workflow_restart(&item.key, None, policy)
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let removed = client
        .trigger_workflow_restart(&item.key, Some("Checksums"), policy)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(repo.get(&item.key).unwrap().events.len(), 1);

    let removed = client
        .trigger_workflow_restart(&item.key, Some("Checksums"), policy)
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn append_gives_up_under_persistent_contention() {
    let (repo, client) = client();
    let item = client.register_item(NewItem::new("RT1")).await.unwrap();
    repo.inject_conflicts(u32::MAX);

    let err = client
        .append_event(&item.key, record("Data_Received", 1, EventOutcome::Success))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConcurrencyExhausted { attempts: 3, .. }));
    assert!(err.is_transient());
    assert!(repo.get(&item.key).unwrap().events.is_empty());
}
