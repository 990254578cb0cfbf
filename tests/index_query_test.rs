//! Trigger query translation to the index query language.

use itemflow::error::Error;
use itemflow::index::{Clause, IndexQuery};
use itemflow::model::TriggerQuery;

#[test]
fn trigger_translates_to_required_and_excluded_clauses() {
    let query = TriggerQuery::new()
        .item_type("batch")
        .success("Data_Received")
        .failure("Metadata")
        .forbid("Manual_QA");

    assert_eq!(
        IndexQuery::from_trigger(&query).to_string(),
        "+item_type:\"batch\" AND +success_event:\"Data_Received\" \
         AND +fail_event:\"Metadata\" AND -success_event:\"Manual_QA\" \
         AND -fail_event:\"Manual_QA\""
    );
}

#[test]
fn stale_criteria_add_no_clause() {
    let query = TriggerQuery::new().stale("Checksums");
    assert!(IndexQuery::from_trigger(&query).clauses.is_empty());
}

#[test]
fn candidates_become_an_any_of_clause() {
    let query = TriggerQuery::new().candidates(["uuid:b", "uuid:a"]);
    let rendered = IndexQuery::from_trigger(&query).to_string();

    assert_eq!(rendered, "item_key:(\"uuid:a\" OR \"uuid:b\")");
}

#[test]
fn rendered_query_parses_back() {
    let query = TriggerQuery::new()
        .candidates(["uuid:a"])
        .success("Data \"Received\"")
        .forbid("Manual_QA");
    let index_query = IndexQuery::from_trigger(&query);

    let parsed: IndexQuery = index_query.to_string().parse().unwrap();
    assert_eq!(parsed, index_query);
}

#[test]
fn parser_tolerates_whitespace_and_empty_input() {
    let parsed: IndexQuery = "  +success_event:\"A\"   AND  item_key:( )  ".parse().unwrap();
    assert_eq!(parsed.clauses.len(), 2);
    assert_eq!(
        parsed.clauses[1],
        Clause::AnyOf {
            field: "item_key".to_string(),
            values: vec![],
        }
    );

    let empty: IndexQuery = "".parse().unwrap();
    assert!(empty.clauses.is_empty());
}

#[test]
fn parser_rejects_unknown_fields_and_bad_syntax() {
    for bad in [
        "+colour:\"red\"",
        "+success_event:\"A\" OR +fail_event:\"B\"",
        "+success_event:\"unterminated",
        "+success_event:A",
    ] {
        let err = bad.parse::<IndexQuery>().unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)), "{bad}: {err:?}");
    }
}
