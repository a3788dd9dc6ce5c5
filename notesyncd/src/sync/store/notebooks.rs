use std::collections::HashSet;

use notesync_core::RemoteNotebook;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{StoreError, StoreTx};
use crate::sync::model::{NotebookInput, NotebookRecord, PendingAction};

const NOTEBOOK_COLUMNS: &str =
    "id, guid, name, stack, is_default, usn, service_created, service_updated, action";
const PLACEHOLDER_DEFAULT_NAME: &str = "Default";

fn notebook_from_row(row: &SqliteRow) -> Result<NotebookRecord, StoreError> {
    let is_default: i64 = row.try_get("is_default")?;
    let action: String = row.try_get("action")?;
    Ok(NotebookRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        name: row.try_get("name")?,
        stack: row.try_get("stack")?,
        is_default: is_default != 0,
        usn: row.try_get("usn")?,
        service_created: row.try_get("service_created")?,
        service_updated: row.try_get("service_updated")?,
        action: PendingAction::parse(&action)?,
    })
}

impl StoreTx {
    pub async fn notebook_by_id(&mut self, id: i64) -> Result<Option<NotebookRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(notebook_from_row).transpose()
    }

    pub async fn notebook_by_guid(
        &mut self,
        guid: &str,
    ) -> Result<Option<NotebookRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE guid = ?1"
        ))
        .bind(guid)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(notebook_from_row).transpose()
    }

    pub async fn default_notebook(&mut self) -> Result<Option<NotebookRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE is_default = 1"
        ))
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(notebook_from_row).transpose()
    }

    pub async fn list_notebooks(&mut self) -> Result<Vec<NotebookRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(notebook_from_row).collect()
    }

    pub async fn insert_notebook(&mut self, input: &NotebookInput) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO notebooks (guid, name, stack, usn, service_created, service_updated, action)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&input.guid)
        .bind(&input.name)
        .bind(&input.stack)
        .bind(input.usn)
        .bind(input.service_created)
        .bind(input.service_updated)
        .bind(input.action.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_notebook_from_remote(
        &mut self,
        id: i64,
        remote: &RemoteNotebook,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notebooks
             SET name = ?2, stack = ?3, usn = ?4, service_created = ?5, service_updated = ?6,
                 action = 'none'
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&remote.name)
        .bind(&remote.stack)
        .bind(remote.usn)
        .bind(remote.service_created)
        .bind(remote.service_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Moves the default flag to `id`; at most one row carries it.
    pub async fn set_default_notebook(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE notebooks SET is_default = 0 WHERE is_default = 1 AND id != ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("UPDATE notebooks SET is_default = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Returns the default notebook, promoting or creating one if needed.
    pub async fn ensure_default_notebook(&mut self) -> Result<NotebookRecord, StoreError> {
        if let Some(existing) = self.default_notebook().await? {
            return Ok(existing);
        }
        let candidate: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM notebooks WHERE action NOT IN ('delete', 'duplicate')
             ORDER BY guid IS NULL, id ASC LIMIT 1",
        )
        .fetch_optional(&mut *self.tx)
        .await?;
        let id = match candidate {
            Some(id) => id,
            None => {
                self.insert_notebook(&NotebookInput {
                    guid: None,
                    name: PLACEHOLDER_DEFAULT_NAME.to_string(),
                    stack: None,
                    usn: None,
                    service_created: None,
                    service_updated: None,
                    action: PendingAction::None,
                })
                .await?
            }
        };
        self.set_default_notebook(id).await?;
        self.notebook_by_id(id).await?.ok_or(StoreError::MissingRow {
            table: "notebooks",
            id,
        })
    }

    pub async fn pending_notebooks(&mut self) -> Result<Vec<NotebookRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks
             WHERE action IN ('create', 'change', 'delete') ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(notebook_from_row).collect()
    }

    pub async fn duplicate_notebooks(&mut self) -> Result<Vec<NotebookRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks WHERE action = 'duplicate' ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(notebook_from_row).collect()
    }

    /// Remote-backed notebook with the same (case-insensitive) name.
    pub async fn find_authoritative_notebook(
        &mut self,
        name: &str,
        exclude_id: i64,
    ) -> Result<Option<NotebookRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {NOTEBOOK_COLUMNS} FROM notebooks
             WHERE lower(name) = lower(?1) AND id != ?2 AND guid IS NOT NULL
               AND action NOT IN ('delete', 'duplicate')
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(name)
        .bind(exclude_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(notebook_from_row).transpose()
    }

    pub async fn mark_notebook_pushed(
        &mut self,
        id: i64,
        remote: &RemoteNotebook,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notebooks
             SET guid = COALESCE(?2, guid), usn = ?3, service_created = COALESCE(?4, service_created),
                 service_updated = COALESCE(?5, service_updated), action = 'none'
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&remote.guid)
        .bind(remote.usn)
        .bind(remote.service_created)
        .bind(remote.service_updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_notebook_action(
        &mut self,
        id: i64,
        action: PendingAction,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE notebooks SET action = ?2 WHERE id = ?1")
            .bind(id)
            .bind(action.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Forgets the remote identity so the notebook is created again on push.
    pub async fn detach_notebook(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE notebooks SET guid = NULL, usn = NULL, action = 'create' WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn reassign_notes(&mut self, from_id: i64, to_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE notes SET notebook_id = ?2 WHERE notebook_id = ?1")
            .bind(from_id)
            .bind(to_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Removes the row; notes that pointed at it fall back to the default notebook.
    pub async fn delete_notebook(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM notebooks WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        self.ensure_default_notebook().await?;
        Ok(())
    }

    /// Deletes notebooks without pending work that were not seen in a full pull.
    pub async fn prune_notebooks(&mut self, seen: &HashSet<i64>) -> Result<u64, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM notebooks WHERE action = 'none'")
            .fetch_all(&mut *self.tx)
            .await?;
        let mut removed = 0;
        for id in ids.into_iter().filter(|id| !seen.contains(id)) {
            sqlx::query("DELETE FROM notebooks WHERE id = ?1")
                .bind(id)
                .execute(&mut *self.tx)
                .await?;
            removed += 1;
        }
        if removed > 0 {
            self.ensure_default_notebook().await?;
        }
        Ok(removed)
    }

    pub async fn create_local_notebook(
        &mut self,
        name: &str,
        stack: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.insert_notebook(&NotebookInput {
            guid: None,
            name: name.to_string(),
            stack: stack.map(str::to_string),
            usn: None,
            service_created: None,
            service_updated: None,
            action: PendingAction::Create,
        })
        .await
    }

    pub async fn rename_local_notebook(
        &mut self,
        id: i64,
        name: &str,
        stack: Option<&str>,
    ) -> Result<(), StoreError> {
        let notebook = self.notebook_by_id(id).await?.ok_or(StoreError::MissingRow {
            table: "notebooks",
            id,
        })?;
        sqlx::query("UPDATE notebooks SET name = ?2, stack = ?3, action = ?4 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .bind(stack)
            .bind(notebook.action.after_local_edit().as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Local delete request: never-pushed rows go away at once.
    pub async fn delete_local_notebook(&mut self, id: i64) -> Result<(), StoreError> {
        let notebook = self.notebook_by_id(id).await?.ok_or(StoreError::MissingRow {
            table: "notebooks",
            id,
        })?;
        if notebook.guid.is_none() {
            return self.delete_notebook(id).await;
        }
        self.set_notebook_action(id, PendingAction::Delete).await?;
        if notebook.is_default {
            sqlx::query("UPDATE notebooks SET is_default = 0 WHERE id = ?1")
                .bind(id)
                .execute(&mut *self.tx)
                .await?;
            self.ensure_default_notebook().await?;
        }
        Ok(())
    }
}
