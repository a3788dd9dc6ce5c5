use std::collections::HashSet;

use notesync_core::RemoteTag;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{StoreError, StoreTx};
use crate::sync::model::{PendingAction, TagRecord};

const TAG_COLUMNS: &str = "id, guid, name, parent_guid, usn, action";

fn tag_from_row(row: &SqliteRow) -> Result<TagRecord, StoreError> {
    let action: String = row.try_get("action")?;
    Ok(TagRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        name: row.try_get("name")?,
        parent_guid: row.try_get("parent_guid")?,
        usn: row.try_get("usn")?,
        action: PendingAction::parse(&action)?,
    })
}

impl StoreTx {
    pub async fn tag_by_id(&mut self, id: i64) -> Result<Option<TagRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    pub async fn tag_by_guid(&mut self, guid: &str) -> Result<Option<TagRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags WHERE guid = ?1"))
            .bind(guid)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    pub async fn list_tags(&mut self) -> Result<Vec<TagRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {TAG_COLUMNS} FROM tags ORDER BY id ASC"))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(tag_from_row).collect()
    }

    pub async fn insert_tag(
        &mut self,
        guid: Option<&str>,
        name: &str,
        parent_guid: Option<&str>,
        usn: Option<i64>,
        action: PendingAction,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO tags (guid, name, parent_guid, usn, action) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(guid)
        .bind(name)
        .bind(parent_guid)
        .bind(usn)
        .bind(action.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_tag_from_remote(
        &mut self,
        id: i64,
        remote: &RemoteTag,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tags SET name = ?2, parent_guid = ?3, usn = ?4, action = 'none' WHERE id = ?1",
        )
        .bind(id)
        .bind(&remote.name)
        .bind(&remote.parent_guid)
        .bind(remote.usn)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn pending_tags(&mut self) -> Result<Vec<TagRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE action IN ('create', 'change', 'delete') ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(tag_from_row).collect()
    }

    pub async fn duplicate_tags(&mut self) -> Result<Vec<TagRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE action = 'duplicate' ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(tag_from_row).collect()
    }

    pub async fn find_authoritative_tag(
        &mut self,
        name: &str,
        exclude_id: i64,
    ) -> Result<Option<TagRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {TAG_COLUMNS} FROM tags
             WHERE lower(name) = lower(?1) AND id != ?2 AND guid IS NOT NULL
               AND action NOT IN ('delete', 'duplicate')
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(name)
        .bind(exclude_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    pub async fn mark_tag_pushed(&mut self, id: i64, remote: &RemoteTag) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tags SET guid = COALESCE(?2, guid), usn = ?3, action = 'none' WHERE id = ?1",
        )
        .bind(id)
        .bind(&remote.guid)
        .bind(remote.usn)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_tag_action(&mut self, id: i64, action: PendingAction) -> Result<(), StoreError> {
        sqlx::query("UPDATE tags SET action = ?2 WHERE id = ?1")
            .bind(id)
            .bind(action.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn detach_tag(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE tags SET guid = NULL, usn = NULL, action = 'create' WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Moves note links from one tag to another, skipping links that already exist.
    pub async fn reassign_tag_links(&mut self, from_id: i64, to_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO note_tags (note_id, tag_id)
             SELECT note_id, ?2 FROM note_tags WHERE tag_id = ?1",
        )
        .bind(from_id)
        .bind(to_id)
        .execute(&mut *self.tx)
        .await?;
        sqlx::query("DELETE FROM note_tags WHERE tag_id = ?1")
            .bind(from_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn delete_tag(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tags WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn prune_tags(&mut self, seen: &HashSet<i64>) -> Result<u64, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM tags WHERE action = 'none'")
            .fetch_all(&mut *self.tx)
            .await?;
        let mut removed = 0;
        for id in ids.into_iter().filter(|id| !seen.contains(id)) {
            self.delete_tag(id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    pub async fn tag_ids_for_guids(&mut self, guids: &[String]) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(guids.len());
        for guid in guids {
            if let Some(tag) = self.tag_by_guid(guid).await? {
                ids.push(tag.id);
            }
        }
        Ok(ids)
    }

    pub async fn create_local_tag(&mut self, name: &str) -> Result<i64, StoreError> {
        self.insert_tag(None, name, None, None, PendingAction::Create)
            .await
    }

    pub async fn rename_local_tag(&mut self, id: i64, name: &str) -> Result<(), StoreError> {
        let tag = self
            .tag_by_id(id)
            .await?
            .ok_or(StoreError::MissingRow { table: "tags", id })?;
        sqlx::query("UPDATE tags SET name = ?2, action = ?3 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .bind(tag.action.after_local_edit().as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn delete_local_tag(&mut self, id: i64) -> Result<(), StoreError> {
        let tag = self
            .tag_by_id(id)
            .await?
            .ok_or(StoreError::MissingRow { table: "tags", id })?;
        if tag.guid.is_none() {
            return self.delete_tag(id).await;
        }
        self.set_tag_action(id, PendingAction::Delete).await
    }
}
