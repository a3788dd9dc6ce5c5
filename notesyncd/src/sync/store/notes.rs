use std::collections::HashSet;

use notesync_core::RemoteNote;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{StoreError, StoreTx};
use crate::sync::model::{
    NoteInput, NoteRecord, NotebookRecord, PendingAction, ShareStatus, now_millis,
};

const NOTE_COLUMNS: &str = "id, guid, title, content, created, updated, updated_local, notebook_id, usn, action, conflict_parent_id, share_date, share_status, share_url, place";

fn note_from_row(row: &SqliteRow) -> Result<NoteRecord, StoreError> {
    let action: String = row.try_get("action")?;
    let share_status: String = row.try_get("share_status")?;
    Ok(NoteRecord {
        id: row.try_get("id")?,
        guid: row.try_get("guid")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        created: row.try_get("created")?,
        updated: row.try_get("updated")?,
        updated_local: row.try_get("updated_local")?,
        notebook_id: row.try_get("notebook_id")?,
        usn: row.try_get("usn")?,
        action: PendingAction::parse(&action)?,
        conflict_parent_id: row.try_get("conflict_parent_id")?,
        share_date: row.try_get("share_date")?,
        share_status: ShareStatus::parse(&share_status)?,
        share_url: row.try_get("share_url")?,
        place: row.try_get("place")?,
    })
}

impl StoreTx {
    pub async fn note_by_id(&mut self, id: i64) -> Result<Option<NoteRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(note_from_row).transpose()
    }

    pub async fn note_by_guid(&mut self, guid: &str) -> Result<Option<NoteRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {NOTE_COLUMNS} FROM notes WHERE guid = ?1"))
            .bind(guid)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(note_from_row).transpose()
    }

    pub async fn list_notes(&mut self) -> Result<Vec<NoteRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY id ASC"))
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(note_from_row).collect()
    }

    pub async fn conflict_copies(&mut self, parent_id: i64) -> Result<Vec<NoteRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE conflict_parent_id = ?1 ORDER BY id ASC"
        ))
        .bind(parent_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(note_from_row).collect()
    }

    pub async fn insert_note(&mut self, input: &NoteInput) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO notes (
                guid, title, content, created, updated, updated_local, notebook_id, usn, action,
                conflict_parent_id, share_date, place
             )
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&input.guid)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.created)
        .bind(input.updated)
        .bind(input.updated_local)
        .bind(input.notebook_id)
        .bind(input.usn)
        .bind(input.action.as_str())
        .bind(input.conflict_parent_id)
        .bind(input.share_date)
        .bind(&input.place)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Overwrites the note with the server version; sharing fields are left alone.
    pub async fn update_note_from_remote(
        &mut self,
        id: i64,
        remote: &RemoteNote,
        notebook_id: Option<i64>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notes
             SET title = ?2, content = ?3, created = ?4, updated = ?5, notebook_id = ?6, usn = ?7,
                 place = ?8, action = 'none'
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&remote.title)
        .bind(remote.content.as_deref().unwrap_or_default())
        .bind(remote.created)
        .bind(remote.updated)
        .bind(notebook_id)
        .bind(remote.usn)
        .bind(&remote.attributes.place_name)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_note_tags(&mut self, note_id: i64, tag_ids: &[i64]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM note_tags WHERE note_id = ?1")
            .bind(note_id)
            .execute(&mut *self.tx)
            .await?;
        for tag_id in tag_ids {
            sqlx::query("INSERT OR IGNORE INTO note_tags (note_id, tag_id) VALUES (?1, ?2)")
                .bind(note_id)
                .bind(tag_id)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    pub async fn note_tag_ids(&mut self, note_id: i64) -> Result<Vec<i64>, StoreError> {
        let ids = sqlx::query_scalar(
            "SELECT tag_id FROM note_tags WHERE note_id = ?1 ORDER BY tag_id ASC",
        )
        .bind(note_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(ids)
    }

    /// Remote guids of the note's tags; tags not yet pushed are skipped.
    pub async fn note_tag_guids(&mut self, note_id: i64) -> Result<Vec<String>, StoreError> {
        let guids = sqlx::query_scalar(
            "SELECT t.guid FROM note_tags nt JOIN tags t ON t.id = nt.tag_id
             WHERE nt.note_id = ?1 AND t.guid IS NOT NULL AND t.action != 'delete'
             ORDER BY t.id ASC",
        )
        .bind(note_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(guids)
    }

    /// Notebook the note lives in, falling back to the default notebook.
    pub async fn notebook_for_note(
        &mut self,
        note: &NoteRecord,
    ) -> Result<NotebookRecord, StoreError> {
        if let Some(notebook_id) = note.notebook_id
            && let Some(notebook) = self.notebook_by_id(notebook_id).await?
        {
            return Ok(notebook);
        }
        self.ensure_default_notebook().await
    }

    /// Notes with work for the push phase, including share requests.
    pub async fn pending_notes(&mut self) -> Result<Vec<NoteRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes
             WHERE action IN ('create', 'change', 'delete')
                OR (action = 'none' AND share_status IN ('need_share', 'need_stop'))
             ORDER BY id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(note_from_row).collect()
    }

    pub async fn mark_note_pushed(&mut self, id: i64, remote: &RemoteNote) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notes SET guid = COALESCE(?2, guid), usn = ?3, updated = ?4, action = 'none'
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&remote.guid)
        .bind(remote.usn)
        .bind(remote.updated)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn set_note_action(&mut self, id: i64, action: PendingAction) -> Result<(), StoreError> {
        sqlx::query("UPDATE notes SET action = ?2 WHERE id = ?1")
            .bind(id)
            .bind(action.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_note_share(
        &mut self,
        id: i64,
        status: ShareStatus,
        share_date: Option<i64>,
        share_url: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notes SET share_status = ?2, share_date = ?3, share_url = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(share_date)
        .bind(share_url)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn detach_note(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE notes SET guid = NULL, usn = NULL, action = 'create' WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("UPDATE resources SET guid = NULL WHERE note_id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Deletes the note and its resources, returning the blob paths to remove.
    pub async fn delete_note(&mut self, id: i64) -> Result<Vec<String>, StoreError> {
        let paths: Vec<String> =
            sqlx::query_scalar("SELECT file_path FROM resources WHERE note_id = ?1")
                .bind(id)
                .fetch_all(&mut *self.tx)
                .await?;
        sqlx::query("DELETE FROM resources WHERE note_id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM notes WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(paths)
    }

    /// Full-pull pruning; returns the number of notes removed and their blob paths.
    pub async fn prune_notes(
        &mut self,
        seen: &HashSet<i64>,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM notes WHERE action = 'none'")
            .fetch_all(&mut *self.tx)
            .await?;
        let mut removed = 0;
        let mut paths = Vec::new();
        for id in ids.into_iter().filter(|id| !seen.contains(id)) {
            paths.extend(self.delete_note(id).await?);
            removed += 1;
        }
        Ok((removed, paths))
    }

    pub async fn create_local_note(
        &mut self,
        title: &str,
        content: &str,
        notebook_id: Option<i64>,
        tag_ids: &[i64],
    ) -> Result<i64, StoreError> {
        let now = now_millis();
        let id = self
            .insert_note(&NoteInput {
                guid: None,
                title: title.to_string(),
                content: content.to_string(),
                created: now,
                updated: now,
                updated_local: Some(now),
                notebook_id,
                usn: None,
                action: PendingAction::Create,
                conflict_parent_id: None,
                share_date: None,
                place: None,
            })
            .await?;
        self.set_note_tags(id, tag_ids).await?;
        Ok(id)
    }

    pub async fn update_local_note(
        &mut self,
        id: i64,
        title: &str,
        content: &str,
        notebook_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let note = self
            .note_by_id(id)
            .await?
            .ok_or(StoreError::MissingRow { table: "notes", id })?;
        sqlx::query(
            "UPDATE notes SET title = ?2, content = ?3, notebook_id = ?4, updated_local = ?5,
                 action = ?6
             WHERE id = ?1",
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(notebook_id)
        .bind(now_millis())
        .bind(note.action.after_local_edit().as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Local delete request; returns blob paths when the row is removed at once.
    pub async fn delete_local_note(&mut self, id: i64) -> Result<Vec<String>, StoreError> {
        let note = self
            .note_by_id(id)
            .await?
            .ok_or(StoreError::MissingRow { table: "notes", id })?;
        if note.guid.is_none() {
            return self.delete_note(id).await;
        }
        self.set_note_action(id, PendingAction::Delete).await?;
        Ok(Vec::new())
    }

    pub async fn request_share(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE notes SET share_status = 'need_share' WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn request_stop_sharing(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE notes SET share_status = 'need_stop' WHERE id = ?1 AND share_status != 'none'",
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}
