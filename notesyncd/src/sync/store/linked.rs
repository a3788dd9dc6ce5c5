use std::collections::HashSet;

use notesync_core::RemoteLinkedNotebook;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{StoreError, StoreTx};
use crate::sync::model::LinkedNotebookRecord;

const LINKED_COLUMNS: &str = "id, guid, share_name, username, shard_id, share_key, uri, usn";

fn linked_from_row(row: &SqliteRow) -> Result<LinkedNotebookRecord, StoreError> {
    Ok(LinkedNotebookRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        share_name: row.try_get("share_name")?,
        username: row.try_get("username")?,
        shard_id: row.try_get("shard_id")?,
        share_key: row.try_get("share_key")?,
        uri: row.try_get("uri")?,
        usn: row.try_get("usn")?,
    })
}

impl StoreTx {
    pub async fn linked_notebook_by_guid(
        &mut self,
        guid: &str,
    ) -> Result<Option<LinkedNotebookRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {LINKED_COLUMNS} FROM linked_notebooks WHERE guid = ?1"
        ))
        .bind(guid)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(linked_from_row).transpose()
    }

    pub async fn list_linked_notebooks(&mut self) -> Result<Vec<LinkedNotebookRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINKED_COLUMNS} FROM linked_notebooks ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(linked_from_row).collect()
    }

    pub async fn upsert_linked_notebook(
        &mut self,
        remote: &RemoteLinkedNotebook,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar(
            "INSERT INTO linked_notebooks (guid, share_name, username, shard_id, share_key, uri, usn)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(guid) DO UPDATE SET
                share_name = excluded.share_name,
                username = excluded.username,
                shard_id = excluded.shard_id,
                share_key = excluded.share_key,
                uri = excluded.uri,
                usn = excluded.usn
             RETURNING id",
        )
        .bind(&remote.guid)
        .bind(&remote.share_name)
        .bind(&remote.username)
        .bind(&remote.shard_id)
        .bind(&remote.share_key)
        .bind(&remote.uri)
        .bind(remote.usn)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(id)
    }

    pub async fn delete_linked_notebook(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM linked_notebooks WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn prune_linked_notebooks(&mut self, seen: &HashSet<i64>) -> Result<u64, StoreError> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM linked_notebooks WHERE action = 'none'")
                .fetch_all(&mut *self.tx)
                .await?;
        let mut removed = 0;
        for id in ids.into_iter().filter(|id| !seen.contains(id)) {
            self.delete_linked_notebook(id).await?;
            removed += 1;
        }
        Ok(removed)
    }
}
