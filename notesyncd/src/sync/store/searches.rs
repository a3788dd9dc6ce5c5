use std::collections::HashSet;

use notesync_core::RemoteSavedSearch;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{StoreError, StoreTx};
use crate::sync::model::SavedSearchRecord;

fn search_from_row(row: &SqliteRow) -> Result<SavedSearchRecord, StoreError> {
    Ok(SavedSearchRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        name: row.try_get("name")?,
        query: row.try_get("query")?,
        usn: row.try_get("usn")?,
    })
}

impl StoreTx {
    pub async fn saved_search_by_guid(
        &mut self,
        guid: &str,
    ) -> Result<Option<SavedSearchRecord>, StoreError> {
        let row = sqlx::query("SELECT id, guid, name, query, usn FROM saved_searches WHERE guid = ?1")
            .bind(guid)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(search_from_row).transpose()
    }

    pub async fn list_saved_searches(&mut self) -> Result<Vec<SavedSearchRecord>, StoreError> {
        let rows = sqlx::query("SELECT id, guid, name, query, usn FROM saved_searches ORDER BY id ASC")
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(search_from_row).collect()
    }

    pub async fn upsert_saved_search(&mut self, remote: &RemoteSavedSearch) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar(
            "INSERT INTO saved_searches (guid, name, query, usn) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(guid) DO UPDATE SET
                name = excluded.name,
                query = excluded.query,
                usn = excluded.usn
             RETURNING id",
        )
        .bind(&remote.guid)
        .bind(&remote.name)
        .bind(&remote.query)
        .bind(remote.usn)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    pub async fn delete_saved_search(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM saved_searches WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn prune_saved_searches(&mut self, seen: &HashSet<i64>) -> Result<u64, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM saved_searches WHERE action = 'none'")
            .fetch_all(&mut *self.tx)
            .await?;
        let mut removed = 0;
        for id in ids.into_iter().filter(|id| !seen.contains(id)) {
            self.delete_saved_search(id).await?;
            removed += 1;
        }
        Ok(removed)
    }
}
