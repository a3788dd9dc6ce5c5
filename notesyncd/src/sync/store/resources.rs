use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{StoreError, StoreTx};
use crate::sync::model::{PendingAction, ResourceInput, ResourceRecord};

const RESOURCE_COLUMNS: &str = "id, guid, note_id, file_name, file_path, mime, hash, action";

fn resource_from_row(row: &SqliteRow) -> Result<ResourceRecord, StoreError> {
    let action: String = row.try_get("action")?;
    Ok(ResourceRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        note_id: row.try_get("note_id")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        mime: row.try_get("mime")?,
        hash: row.try_get("hash")?,
        action: PendingAction::parse(&action)?,
    })
}

impl StoreTx {
    pub async fn resource_by_guid(
        &mut self,
        guid: &str,
    ) -> Result<Option<ResourceRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE guid = ?1"
        ))
        .bind(guid)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(resource_from_row).transpose()
    }

    pub async fn resources_for_note(
        &mut self,
        note_id: i64,
    ) -> Result<Vec<ResourceRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources WHERE note_id = ?1 ORDER BY id ASC"
        ))
        .bind(note_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(resource_from_row).collect()
    }

    pub async fn insert_resource(&mut self, input: &ResourceInput) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO resources (guid, note_id, file_name, file_path, mime, hash, action)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&input.guid)
        .bind(input.note_id)
        .bind(&input.file_name)
        .bind(&input.file_path)
        .bind(&input.mime)
        .bind(&input.hash)
        .bind(input.action.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_resource_content(
        &mut self,
        id: i64,
        file_name: &str,
        file_path: &str,
        mime: &str,
        hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE resources SET file_name = ?2, file_path = ?3, mime = ?4, hash = ?5, action = 'none'
             WHERE id = ?1",
        )
        .bind(id)
        .bind(file_name)
        .bind(file_path)
        .bind(mime)
        .bind(hash)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Records the guid the server assigned to a pushed resource.
    pub async fn mark_resource_pushed(&mut self, id: i64, guid: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE resources SET guid = ?2, action = 'none' WHERE id = ?1")
            .bind(id)
            .bind(guid)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn delete_resource(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM resources WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn attach_local_resource(
        &mut self,
        note_id: i64,
        file_name: &str,
        file_path: &str,
        mime: &str,
        hash: &str,
    ) -> Result<i64, StoreError> {
        let id = self
            .insert_resource(&ResourceInput {
                guid: None,
                note_id,
                file_name: file_name.to_string(),
                file_path: file_path.to_string(),
                mime: mime.to_string(),
                hash: hash.to_string(),
                action: PendingAction::Create,
            })
            .await?;
        self.touch_note_for_resource(note_id).await?;
        Ok(id)
    }

    /// Marks the resource for removal; the parent note is pushed without it.
    pub async fn remove_local_resource(&mut self, id: i64) -> Result<(), StoreError> {
        let note_id: Option<i64> = sqlx::query_scalar("SELECT note_id FROM resources WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(note_id) = note_id else {
            return Err(StoreError::MissingRow {
                table: "resources",
                id,
            });
        };
        sqlx::query("UPDATE resources SET action = 'delete' WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        self.touch_note_for_resource(note_id).await
    }

    async fn touch_note_for_resource(&mut self, note_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notes SET action = CASE WHEN action IN ('create', 'conflict', 'delete') THEN action ELSE 'change' END
             WHERE id = ?1",
        )
        .bind(note_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
