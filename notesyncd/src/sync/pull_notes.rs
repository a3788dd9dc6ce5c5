use std::collections::HashSet;

use notesync_core::{
    EntityKind, GatewayError, RemoteGateway, RemoteNote, RemoteResource, SyncChunk,
};
use tracing::{debug, info, warn};

use super::blobs::{BlobError, BlobJournal};
use super::context::{CycleContext, SyncEvent};
use super::error::SyncError;
use super::model::{NoteInput, NoteRecord, PendingAction, ResourceInput, ShareStatus};
use super::paths::{blob_path_for, fallback_file_name};
use super::pull::{PullKind, PullReport};
use super::sharing::{NoteSharing, Shareable};
use super::store::{StoreError, StoreTx};

/// Notes plus their resources and sharing state.
#[derive(Debug, Default)]
pub struct NotePull {
    sharing: NoteSharing,
}

impl NotePull {
    /// Change-feed records omit content and resources.
    async fn full_record<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        remote: RemoteNote,
        guid: &str,
    ) -> Result<Option<RemoteNote>, SyncError> {
        if !remote.is_partial() {
            return Ok(Some(remote));
        }
        match ctx.gateway.fetch_note(guid).await {
            Ok(full) => Ok(Some(full)),
            Err(GatewayError::NotFound(_)) => {
                debug!(guid, "note vanished before it could be fetched");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_children<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        note_id: i64,
        remote: &RemoteNote,
    ) -> Result<(), SyncError> {
        let tag_ids = tx.tag_ids_for_guids(&remote.tag_guids).await?;
        tx.set_note_tags(note_id, &tag_ids).await?;
        let resources = remote.resources.as_deref().unwrap_or_default();
        reconcile_resources(ctx, tx, blobs, note_id, resources).await
    }

    async fn reconcile_sharing<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        local: &NoteRecord,
        remote_share_date: Option<i64>,
    ) -> Result<(), SyncError> {
        match remote_share_date {
            None => {
                if !matches!(local.share_status, ShareStatus::None | ShareStatus::NeedShare) {
                    self.sharing.clear_sharing(tx, local.id).await?;
                }
            }
            Some(date) => {
                let pending = matches!(
                    local.share_status,
                    ShareStatus::NeedShare | ShareStatus::NeedStop
                );
                if local.share_date != Some(date)
                    && !pending
                    && let Some(guid) = local.guid.as_deref()
                {
                    self.sharing.share(ctx, tx, local.id, guid, Some(date)).await?;
                }
            }
        }
        Ok(())
    }
}

async fn notebook_id_for(tx: &mut StoreTx, remote: &RemoteNote) -> Result<Option<i64>, StoreError> {
    let Some(guid) = remote.notebook_guid.as_deref() else {
        return Ok(None);
    };
    Ok(tx.notebook_by_guid(guid).await?.map(|notebook| notebook.id))
}

fn note_input(
    remote: &RemoteNote,
    guid: Option<String>,
    notebook_id: Option<i64>,
    action: PendingAction,
    conflict_parent_id: Option<i64>,
) -> NoteInput {
    NoteInput {
        guid,
        title: remote.title.clone(),
        content: remote.content.clone().unwrap_or_default(),
        created: remote.created,
        updated: remote.updated,
        updated_local: None,
        notebook_id,
        usn: Some(remote.usn),
        action,
        conflict_parent_id,
        share_date: None,
        place: remote.attributes.place_name.clone(),
    }
}

/// Brings the note's resource rows and blobs in line with the server list.
async fn reconcile_resources<G: RemoteGateway>(
    ctx: &CycleContext<'_, G>,
    tx: &mut StoreTx,
    blobs: &mut BlobJournal,
    note_id: i64,
    resources: &[RemoteResource],
) -> Result<(), SyncError> {
    let mut kept = HashSet::new();
    for resource in resources {
        let Some(guid) = resource.guid.as_deref().filter(|guid| !guid.is_empty()) else {
            continue;
        };
        let existing = tx.resource_by_guid(guid).await?;
        if let Some(local) = &existing
            && local.hash.eq_ignore_ascii_case(&resource.body_hash)
        {
            kept.insert(local.id);
            continue;
        }

        let file_name = resource
            .file_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback_file_name(guid, &resource.mime));
        let path = blob_path_for(&ctx.config.blob_root, note_id, &resource.body_hash, &file_name)?;
        let body = ctx.gateway.fetch_blob(guid).await?;
        match blobs.stage(&path, &body, &resource.body_hash).await {
            Ok(_) => {}
            Err(BlobError::IntegrityMismatch {
                expected_md5,
                actual_md5,
            }) => {
                warn!(
                    resource = guid,
                    expected_md5 = %expected_md5,
                    actual_md5 = %actual_md5,
                    "resource body does not match its hash, skipping"
                );
                if let Some(local) = &existing {
                    kept.insert(local.id);
                }
                continue;
            }
            Err(err) => return Err(err.into()),
        }

        let file_path = path.to_string_lossy().into_owned();
        match existing {
            Some(local) => {
                if local.file_path != file_path {
                    blobs.doom(&local.file_path);
                }
                tx.update_resource_content(
                    local.id,
                    &file_name,
                    &file_path,
                    &resource.mime,
                    &resource.body_hash,
                )
                .await?;
                kept.insert(local.id);
            }
            None => {
                let id = tx
                    .insert_resource(&ResourceInput {
                        guid: Some(guid.to_string()),
                        note_id,
                        file_name,
                        file_path,
                        mime: resource.mime.clone(),
                        hash: resource.body_hash.clone(),
                        action: PendingAction::None,
                    })
                    .await?;
                kept.insert(id);
            }
        }
    }

    for local in tx.resources_for_note(note_id).await? {
        if kept.contains(&local.id) || local.action == PendingAction::Create {
            continue;
        }
        tx.delete_resource(local.id).await?;
        blobs.doom(&local.file_path);
    }
    Ok(())
}

impl PullKind for NotePull {
    const KIND: EntityKind = EntityKind::Note;
    type Record = RemoteNote;

    fn take_records(chunk: &mut SyncChunk) -> Vec<RemoteNote> {
        std::mem::take(&mut chunk.notes)
    }

    fn remote_guid(record: &RemoteNote) -> Option<&str> {
        record.guid.as_deref()
    }

    async fn apply<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        remote: RemoteNote,
        report: &mut PullReport,
    ) -> Result<Option<i64>, SyncError> {
        let Some(guid) = remote.guid.clone() else {
            return Ok(None);
        };
        // Trashed notes are handled like expunged ones.
        if remote.deleted.is_some() {
            self.expunge(ctx, tx, blobs, &guid, report).await?;
            return Ok(None);
        }

        let Some(local) = tx.note_by_guid(&guid).await? else {
            let Some(full) = self.full_record(ctx, remote, &guid).await? else {
                return Ok(None);
            };
            let notebook_id = notebook_id_for(tx, &full).await?;
            let id = tx
                .insert_note(&note_input(
                    &full,
                    Some(guid.clone()),
                    notebook_id,
                    PendingAction::None,
                    None,
                ))
                .await?;
            self.write_children(ctx, tx, blobs, id, &full).await?;
            let inserted = tx
                .note_by_id(id)
                .await?
                .ok_or(StoreError::MissingRow { table: "notes", id })?;
            self.reconcile_sharing(ctx, tx, &inserted, full.attributes.share_date)
                .await?;
            report.created += 1;
            return Ok(Some(id));
        };

        if remote.updated <= local.updated {
            self.reconcile_sharing(ctx, tx, &local, remote.attributes.share_date)
                .await?;
            return Ok(Some(local.id));
        }

        match local.action {
            PendingAction::None => {
                let Some(full) = self.full_record(ctx, remote, &guid).await? else {
                    return Ok(Some(local.id));
                };
                let notebook_id = notebook_id_for(tx, &full).await?;
                tx.update_note_from_remote(local.id, &full, notebook_id)
                    .await?;
                self.write_children(ctx, tx, blobs, local.id, &full).await?;
                self.reconcile_sharing(ctx, tx, &local, full.attributes.share_date)
                    .await?;
                report.updated += 1;
            }
            PendingAction::Change => {
                let already_copied = tx
                    .conflict_copies(local.id)
                    .await?
                    .iter()
                    .any(|copy| copy.updated == remote.updated);
                if already_copied {
                    return Ok(Some(local.id));
                }
                let Some(full) = self.full_record(ctx, remote, &guid).await? else {
                    return Ok(Some(local.id));
                };
                let notebook_id = notebook_id_for(tx, &full).await?;
                let copy = tx
                    .insert_note(&note_input(
                        &full,
                        None,
                        notebook_id,
                        PendingAction::Conflict,
                        Some(local.id),
                    ))
                    .await?;
                let tag_ids = tx.tag_ids_for_guids(&full.tag_guids).await?;
                tx.set_note_tags(copy, &tag_ids).await?;
                info!(note_id = local.id, copy_id = copy, "remote edit conflicts with local change");
                ctx.emit(SyncEvent::ConflictCreated {
                    original: local.id,
                    copy,
                });
                report.conflicts += 1;
            }
            _ => {
                debug!(note_id = local.id, action = local.action.as_str(), "skipping remote update");
                report.skipped += 1;
            }
        }
        Ok(Some(local.id))
    }

    async fn expunge<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        guid: &str,
        report: &mut PullReport,
    ) -> Result<(), SyncError> {
        let Some(local) = tx.note_by_guid(guid).await? else {
            return Ok(());
        };
        match local.action {
            PendingAction::None | PendingAction::Delete => {
                for path in tx.delete_note(local.id).await? {
                    blobs.doom(path);
                }
                report.removed += 1;
            }
            _ => tx.detach_note(local.id).await?,
        }
        Ok(())
    }

    async fn prune(
        &self,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        seen: &HashSet<i64>,
    ) -> Result<u64, SyncError> {
        let (removed, paths) = tx.prune_notes(seen).await?;
        for path in paths {
            blobs.doom(path);
        }
        Ok(removed)
    }
}
