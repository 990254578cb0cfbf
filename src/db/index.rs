//! Index search over the `item_index` view.
//!
//! Query strings are parsed into [`IndexQuery`] and translated to SQL with
//! bound parameters. Pages are keyset-paginated on `item_key`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use crate::error::{Error, Result};
use crate::index::query::{FAIL_EVENT, ITEM_KEY, ITEM_TYPE, SUCCESS_EVENT};
use crate::index::{Clause, IndexHit, IndexPage, IndexQuery, ItemIndex, PageCursor};
use crate::model::{Event, Item, ItemKey, VersionMarker};

type IndexRow = (
    String,
    Option<String>,
    Option<String>,
    Json<Vec<Event>>,
    DateTime<Utc>,
);

/// How a query field maps onto the view.
enum Column {
    /// Array column; a value matches if the array contains it.
    Array(&'static str),
    /// Scalar column; a value matches on equality.
    Scalar(&'static str),
}

fn column(field: &str) -> Result<Column> {
    match field {
        SUCCESS_EVENT => Ok(Column::Array("success_events")),
        FAIL_EVENT => Ok(Column::Array("fail_events")),
        ITEM_TYPE => Ok(Column::Scalar("item_type")),
        ITEM_KEY => Ok(Column::Scalar("item_key")),
        other => Err(Error::InvalidQuery(format!("unknown field '{other}'"))),
    }
}

fn push_contains(sql: &mut QueryBuilder<'_, Postgres>, field: &str, value: &str) -> Result<()> {
    match column(field)? {
        Column::Array(col) => {
            sql.push("(");
            sql.push_bind(value.to_string());
            sql.push(format!(" = ANY({col}))"));
        }
        Column::Scalar(col) => {
            sql.push(format!("({col} IS NOT DISTINCT FROM "));
            sql.push_bind(value.to_string());
            sql.push(")");
        }
    }
    Ok(())
}

fn push_clause(sql: &mut QueryBuilder<'_, Postgres>, clause: &Clause) -> Result<()> {
    sql.push(" AND ");
    match clause {
        Clause::Require { field, value } => push_contains(sql, field, value),
        Clause::Exclude { field, value } => {
            sql.push("NOT ");
            push_contains(sql, field, value)
        }
        Clause::AnyOf { field, values } => {
            match column(field)? {
                Column::Array(col) => {
                    sql.push(format!("({col} && "));
                    sql.push_bind(values.clone());
                    sql.push(")");
                }
                Column::Scalar(col) => {
                    sql.push(format!("({col} = ANY("));
                    sql.push_bind(values.clone());
                    sql.push("))");
                }
            }
            Ok(())
        }
    }
}

#[async_trait]
impl ItemIndex for super::Db {
    async fn search(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<IndexPage> {
        let parsed: IndexQuery = query.parse()?;
        let page_size = page_size.max(1);

        let mut sql: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT item_key, external_id, item_type, summary_events, last_modified
             FROM item_index WHERE TRUE",
        );
        for clause in &parsed.clauses {
            push_clause(&mut sql, clause)?;
        }
        if let Some(PageCursor(after)) = cursor {
            sql.push(" AND item_key > ");
            sql.push_bind(after.clone());
        }
        sql.push(" ORDER BY item_key LIMIT ");
        // One extra row tells us whether another page exists.
        sql.push_bind(page_size as i64 + 1);

        let mut rows: Vec<IndexRow> = sql
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(|e| Error::Communication(format!("index search failed: {e}")))?;

        let more = rows.len() > page_size;
        rows.truncate(page_size);

        let hits: Vec<IndexHit> = rows
            .into_iter()
            .map(|(key, external_id, item_type, events, last_modified)| {
                let key = ItemKey(key);
                IndexHit {
                    summary: Some(Item {
                        key: key.clone(),
                        external_id,
                        item_type,
                        events: events.0,
                        last_modified: VersionMarker(last_modified),
                    }),
                    key,
                }
            })
            .collect();

        let next = match hits.last() {
            Some(last) if more => Some(PageCursor(last.key.0.clone())),
            _ => None,
        };

        Ok(IndexPage { hits, next })
    }
}
