//! Optimistic update driver against the in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use itemflow::error::Error;
use itemflow::eventlog::{EventLogUpdater, LogTransform, RetryPolicy};
use itemflow::model::{Event, Item, ItemKey, VersionMarker};
use itemflow::repository::memory::InMemoryRepository;

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
}

fn fast(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1))
}

/// Repository holding one item with the e1..e8 log (e3, e6 failed).
fn seeded() -> (Arc<InMemoryRepository>, ItemKey) {
    let repo = Arc::new(InMemoryRepository::new());
    let key = ItemKey::from("uuid:batch-1");
    let events = (1..=8)
        .map(|n| {
            let id = format!("e{n}");
            if n == 3 || n == 6 {
                Event::failure(id, at(n))
            } else {
                Event::success(id, at(n))
            }
        })
        .collect();
    repo.insert(Item {
        key: key.clone(),
        external_id: Some("B400022028241-RT1".to_string()),
        item_type: Some("batch".to_string()),
        events,
        last_modified: VersionMarker(at(30)),
    });
    (repo, key)
}

fn updater(repo: &Arc<InMemoryRepository>) -> EventLogUpdater {
    EventLogUpdater::new(repo.clone())
}

#[tokio::test]
async fn restart_without_contention_writes_once() {
    let (repo, key) = seeded();

    let outcome = updater(&repo)
        .apply_update(&key, &LogTransform::RestartFromFirstFailure, fast(3))
        .await
        .unwrap();

    assert_eq!(outcome.affected, 6);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(repo.conditional_writes(), 1);
    let stored = repo.get(&key).unwrap();
    assert_eq!(stored.events.len(), 2);
    assert_eq!(Some(stored.last_modified), outcome.version);
}

#[tokio::test]
async fn single_conflict_succeeds_on_second_attempt() {
    let (repo, key) = seeded();
    repo.inject_conflicts(1);

    let outcome = updater(&repo)
        .apply_update(&key, &LogTransform::RestartFromEvent("e5".to_string()), fast(5))
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.affected, 4);
    assert_eq!(repo.conditional_writes(), 2);
    assert_eq!(repo.get(&key).unwrap().events.len(), 4);
}

#[tokio::test]
async fn exhausted_retries_leave_the_log_unchanged() {
    let (repo, key) = seeded();
    let before = repo.get(&key).unwrap().events;
    repo.inject_conflicts(u32::MAX);

    let err = updater(&repo)
        .apply_update(&key, &LogTransform::RestartFromFirstFailure, fast(4))
        .await
        .unwrap_err();

    match err {
        Error::ConcurrencyExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("expected ConcurrencyExhausted, got {other:?}"),
    }
    assert_eq!(repo.conditional_writes(), 4);
    assert_eq!(repo.get(&key).unwrap().events, before);
}

#[tokio::test]
async fn noop_transform_issues_no_write() {
    let (repo, key) = seeded();
    let before = repo.get(&key).unwrap();

    let outcome = updater(&repo)
        .apply_update(
            &key,
            &LogTransform::RestartFromEvent("Never_Happened".to_string()),
            fast(3),
        )
        .await
        .unwrap();

    assert_eq!(outcome.affected, 0);
    assert_eq!(outcome.version, None);
    assert_eq!(repo.conditional_writes(), 0);
    assert!(repo.backups().is_empty());
    assert_eq!(repo.get(&key).unwrap(), before);
}

#[tokio::test]
async fn zero_max_attempts_still_tries_once() {
    let (repo, key) = seeded();

    let outcome = updater(&repo)
        .apply_update(&key, &LogTransform::RestartFromFirstFailure, fast(0))
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(repo.conditional_writes(), 1);
}

#[tokio::test]
async fn unknown_item_is_not_found_without_writing() {
    let (repo, _) = seeded();

    let err = updater(&repo)
        .apply_update(
            &ItemKey::from("uuid:missing"),
            &LogTransform::RestartFromFirstFailure,
            fast(3),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(repo.conditional_writes(), 0);
}

// ---------------------------------------------------------------------------
// Backups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn destructive_rewrite_backs_up_the_previous_log() {
    let (repo, key) = seeded();
    let before = repo.get(&key).unwrap();

    updater(&repo)
        .apply_update(&key, &LogTransform::RestartFromFirstFailure, fast(3))
        .await
        .unwrap();

    let backups = repo.backups();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0].key, key);
    assert_eq!(backups[0].events, before.events);
    assert_eq!(backups[0].version, before.last_modified);
}

#[tokio::test]
async fn append_takes_no_backup() {
    let (repo, key) = seeded();

    updater(&repo)
        .apply_update(&key, &LogTransform::Append(Event::success("e9", at(9))), fast(3))
        .await
        .unwrap();

    assert!(repo.backups().is_empty());
    assert_eq!(repo.get(&key).unwrap().events.len(), 9);
}

#[tokio::test]
async fn failed_backup_does_not_block_the_write() {
    let (repo, key) = seeded();
    repo.fail_backups(true);

    let outcome = updater(&repo)
        .apply_update(&key, &LogTransform::RestartFromFirstFailure, fast(3))
        .await
        .unwrap();

    assert_eq!(outcome.affected, 6);
    assert_eq!(repo.get(&key).unwrap().events.len(), 2);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_write_moves_the_version_forward() {
    let (repo, key) = seeded();
    let updater = updater(&repo);

    let mut previous = repo.get(&key).unwrap().last_modified;
    for n in 0..5 {
        let outcome = updater
            .apply_update(
                &key,
                &LogTransform::Append(Event::success(format!("step-{n}"), at(40))),
                fast(3),
            )
            .await
            .unwrap();
        let version = outcome.version.unwrap();
        assert!(version > previous);
        previous = version;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_are_never_lost() {
    let (repo, key) = seeded();
    let updater = updater(&repo);

    let mut handles = Vec::new();
    for n in 0..10 {
        let updater = updater.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            updater
                .apply_update(
                    &key,
                    &LogTransform::Append(Event::success(format!("writer-{n}"), at(45))),
                    fast(50),
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = repo.get(&key).unwrap();
    assert_eq!(stored.events.len(), 18);
    for n in 0..10 {
        let id = format!("writer-{n}");
        assert_eq!(stored.events.iter().filter(|e| e.event_id == id).count(), 1);
    }
}
