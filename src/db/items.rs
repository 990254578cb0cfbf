//! Item logs with compare-and-swap on `last_modified`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::error::{Error, Result};
use crate::model::{Event, Item, ItemKey, NewItem, VersionMarker};
use crate::repository::EventRepository;

type ItemRow = (
    String,
    Option<String>,
    Option<String>,
    Json<Vec<Event>>,
    DateTime<Utc>,
);

fn item_from_row((key, external_id, item_type, events, last_modified): ItemRow) -> Item {
    Item {
        key: ItemKey(key),
        external_id,
        item_type,
        events: events.0,
        last_modified: VersionMarker(last_modified),
    }
}

#[async_trait]
impl EventRepository for super::Db {
    async fn read_item(&self, key: &ItemKey) -> Result<Item> {
        let row: Option<ItemRow> = sqlx::query_as(
            "SELECT item_key, external_id, item_type, events, last_modified
             FROM items WHERE item_key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_from_row)
            .ok_or_else(|| Error::NotFound(format!("item {key}")))
    }

    async fn write_events_if_version_matches(
        &self,
        key: &ItemKey,
        events: &[Event],
        expected: &VersionMarker,
    ) -> Result<VersionMarker> {
        let next = expected.next();
        let updated = sqlx::query(
            "UPDATE items SET events = $1, last_modified = $2
             WHERE item_key = $3 AND last_modified = $4",
        )
        .bind(Json(events))
        .bind(next.timestamp())
        .bind(key.as_str())
        .bind(expected.timestamp())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(next);
        }

        // Zero rows: either the item is gone or another writer moved the marker.
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT item_key FROM items WHERE item_key = $1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Err(Error::VersionConflict(key.to_string())),
            None => Err(Error::NotFound(format!("item {key}"))),
        }
    }

    async fn find_key_by_external_id(&self, external_id: &str) -> Result<ItemKey> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT item_key FROM items WHERE external_id = $1")
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(key,)| ItemKey(key))
            .ok_or_else(|| Error::NotFound(format!("item with external id {external_id}")))
    }

    async fn backup_events(
        &self,
        key: &ItemKey,
        events: &[Event],
        version: &VersionMarker,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO event_log_backups (item_key, version, events) VALUES ($1, $2, $3)",
        )
        .bind(key.as_str())
        .bind(version.timestamp())
        .bind(Json(events))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_item(&self, new: NewItem) -> Result<Item> {
        let key = ItemKey::generate();
        let marker = VersionMarker::initial();

        let inserted: Option<ItemRow> = sqlx::query_as(
            "INSERT INTO items (item_key, external_id, item_type, events, last_modified)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (external_id) DO NOTHING
             RETURNING item_key, external_id, item_type, events, last_modified",
        )
        .bind(key.as_str())
        .bind(&new.external_id)
        .bind(&new.item_type)
        .bind(Json(&new.initial_events))
        .bind(marker.timestamp())
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(item_from_row(row)),
            None => {
                let existing = self.find_key_by_external_id(&new.external_id).await?;
                self.read_item(&existing).await
            }
        }
    }
}
