//! Exact trigger matching over collapsed event histories.

use chrono::{DateTime, TimeZone, Utc};
use itemflow::model::{Event, Item, ItemKey, TriggerQuery, VersionMarker};
use itemflow::trigger::{collapse_newest, matches};

fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
}

fn item(events: Vec<Event>) -> Item {
    Item {
        key: ItemKey::from("uuid:item"),
        external_id: Some("B400022028241-RT1".to_string()),
        item_type: Some("batch".to_string()),
        events,
        last_modified: VersionMarker(at(30)),
    }
}

#[test]
fn newest_occurrence_decides_success() {
    let failed_then_fixed = item(vec![
        Event::failure("Checksums", at(1)),
        Event::success("Checksums", at(2)),
    ]);
    let fixed_then_failed = item(vec![
        Event::success("Checksums", at(1)),
        Event::failure("Checksums", at(2)),
    ]);
    let query = TriggerQuery::new().success("Checksums");

    assert!(matches(&failed_then_fixed, &query));
    assert!(!matches(&fixed_then_failed, &query));
}

#[test]
fn newest_is_by_timestamp_not_write_order() {
    // Retries can append an older event after a newer one.
    let log = item(vec![
        Event::success("Checksums", at(5)),
        Event::failure("Checksums", at(2)),
    ]);

    assert!(matches(&log, &TriggerQuery::new().success("Checksums")));
    assert!(!matches(&log, &TriggerQuery::new().failure("Checksums")));
}

#[test]
fn required_failure_needs_a_failed_newest_occurrence() {
    let log = item(vec![
        Event::success("Data_Received", at(1)),
        Event::failure("Metadata", at(2)),
    ]);

    assert!(matches(&log, &TriggerQuery::new().failure("Metadata")));
    assert!(!matches(&log, &TriggerQuery::new().failure("Data_Received")));
    assert!(!matches(&log, &TriggerQuery::new().failure("Never_Ran")));
}

#[test]
fn stale_or_absent_accepts_missing_and_outdated_events() {
    let log = item(vec![
        Event::success("Data_Received", at(1)),
        Event::success("Old_Check", at(10)),
    ]);
    let mut fresh = log.clone();
    fresh.events.push(Event::success("Fresh_Check", at(40)));

    assert!(matches(&log, &TriggerQuery::new().stale("Never_Ran")));
    assert!(matches(&log, &TriggerQuery::new().stale("Old_Check")));
    assert!(!matches(&fresh, &TriggerQuery::new().stale("Fresh_Check")));
}

#[test]
fn stale_boundary_is_inclusive() {
    let log = item(vec![Event::success("Check", at(30))]);
    assert!(matches(&log, &TriggerQuery::new().stale("Check")));
}

#[test]
fn forbidden_rejects_any_outcome() {
    let succeeded = item(vec![Event::success("Manual_QA", at(1))]);
    let failed = item(vec![Event::failure("Manual_QA", at(1))]);
    let query = TriggerQuery::new().forbid("Manual_QA");

    assert!(!matches(&succeeded, &query));
    assert!(!matches(&failed, &query));
    assert!(matches(&item(vec![]), &query));
}

#[test]
fn criteria_are_conjunctive() {
    let log = item(vec![
        Event::success("Data_Received", at(1)),
        Event::success("Metadata", at(2)),
    ]);
    let query = TriggerQuery::new()
        .success("Data_Received")
        .success("Metadata")
        .stale("Checksums")
        .forbid("Manual_QA");
    assert!(matches(&log, &query));

    let query = query.success("Checksums");
    assert!(!matches(&log, &query));
}

#[test]
fn empty_query_matches_everything() {
    assert!(matches(&item(vec![]), &TriggerQuery::new()));
}

#[test]
fn type_filter_rejects_other_and_unknown_kinds() {
    let batch = item(vec![]);
    let mut unknown = item(vec![]);
    unknown.item_type = None;

    assert!(matches(&batch, &TriggerQuery::new().item_type("batch")));
    assert!(!matches(&batch, &TriggerQuery::new().item_type("edition")));
    assert!(!matches(&unknown, &TriggerQuery::new().item_type("batch")));
}

#[test]
fn candidate_set_restricts_and_empty_set_matches_nothing() {
    let log = item(vec![Event::success("Data_Received", at(1))]);

    let listed = TriggerQuery::new().candidates(["uuid:item", "uuid:other"]);
    let unlisted = TriggerQuery::new().candidates(["uuid:other"]);
    let empty = TriggerQuery::new().candidates(Vec::<ItemKey>::new());

    assert!(matches(&log, &listed));
    assert!(!matches(&log, &unlisted));
    assert!(!matches(&log, &empty));
    assert!(empty.excludes_everything());
}

#[test]
fn result_does_not_depend_on_write_order() {
    let events = vec![
        Event::success("Data_Received", at(1)),
        Event::failure("Checksums", at(2)),
        Event::success("Checksums", at(3)),
        Event::success("Metadata", at(4)),
        Event::failure("Metadata", at(5)),
    ];
    let queries = [
        TriggerQuery::new().success("Checksums"),
        TriggerQuery::new().failure("Metadata"),
        TriggerQuery::new().success("Data_Received").forbid("Manual_QA"),
        TriggerQuery::new().stale("Metadata"),
    ];

    let forward = item(events.clone());
    let mut reversed_events = events;
    reversed_events.reverse();
    let reversed = item(reversed_events);

    for query in &queries {
        assert_eq!(matches(&forward, query), matches(&reversed, query));
    }
}

#[test]
fn equal_timestamps_resolve_to_the_later_entry() {
    let events = vec![
        Event::failure("Checksums", at(2)),
        Event::success("Checksums", at(2)),
    ];
    let newest = collapse_newest(&events);

    assert!(newest["Checksums"].is_success());
    assert_eq!(newest.len(), 1);
}
