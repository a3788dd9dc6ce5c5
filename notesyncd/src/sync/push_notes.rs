use notesync_core::{EntityKind, NotePayload, RemoteGateway, ResourcePayload};
use tracing::{debug, warn};

use super::blobs::BlobJournal;
use super::context::CycleContext;
use super::error::SyncError;
use super::model::{NoteRecord, PendingAction, ResourceRecord, ShareStatus};
use super::push::{PushKind, PushReport, RemoteOutcome, classify, report_invalid};
use super::sharing::{NoteSharing, Shareable};
use super::store::{StoreError, StoreTx};
use super::validate;

#[derive(Debug, Default)]
pub struct NotePush {
    sharing: NoteSharing,
}

impl NotePush {
    async fn push_content<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        note: &NoteRecord,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        let title = match validate::note_title(&note.title) {
            Ok(title) => title,
            Err(err) => {
                tx.set_note_action(note.id, PendingAction::None).await?;
                report_invalid(ctx, EntityKind::Note, note.id, &err, report);
                return Ok(());
            }
        };
        let notebook = tx.notebook_for_note(note).await?;
        let tag_guids = tx.note_tag_guids(note.id).await?;
        let resources = tx.resources_for_note(note.id).await?;

        let mut payload = NotePayload {
            guid: note.guid.clone(),
            title,
            content: note.content.clone(),
            notebook_guid: notebook.guid.clone(),
            tag_guids,
            resources: resource_payloads(&resources).await,
            created: note.created,
            updated: note.updated_local.unwrap_or(note.updated),
        };

        let updating = note.action == PendingAction::Change && note.guid.is_some();
        let mut created = !updating;
        let outcome = if updating {
            match classify(ctx.gateway.update_note(&payload).await)? {
                RemoteOutcome::NotFound => {
                    debug!(note_id = note.id, "note gone remotely, creating it again");
                    payload.guid = None;
                    for resource in &mut payload.resources {
                        resource.guid = None;
                    }
                    created = true;
                    classify(ctx.gateway.create_note(&payload).await)?
                }
                other => other,
            }
        } else {
            payload.guid = None;
            classify(ctx.gateway.create_note(&payload).await)?
        };

        let remote = match outcome {
            RemoteOutcome::Done(remote) => remote,
            RemoteOutcome::Duplicate | RemoteOutcome::NotFound | RemoteOutcome::Rejected(_) => {
                warn!(note_id = note.id, "remote refused note, dropping change");
                tx.set_note_action(note.id, PendingAction::None).await?;
                report.rejected += 1;
                return Ok(());
            }
        };

        tx.mark_note_pushed(note.id, &remote).await?;
        let remote_resources = remote.resources.unwrap_or_default();
        for local in resources {
            if local.action == PendingAction::Delete {
                tx.delete_resource(local.id).await?;
                blobs.doom(&local.file_path);
                continue;
            }
            let matched = remote_resources
                .iter()
                .find(|remote| remote.body_hash.eq_ignore_ascii_case(&local.hash))
                .and_then(|remote| remote.guid.as_deref());
            if let Some(guid) = matched.or(local.guid.as_deref())
                && (local.guid.is_none() || local.action != PendingAction::None)
            {
                tx.mark_resource_pushed(local.id, guid).await?;
            }
        }
        if created {
            report.created += 1;
        } else {
            report.updated += 1;
        }
        Ok(())
    }

    async fn apply_share_request<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        note_id: i64,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        let Some(note) = tx.note_by_id(note_id).await? else {
            return Ok(());
        };
        // Sharing needs the note on the server first.
        let Some(guid) = note.guid.as_deref() else {
            return Ok(());
        };
        match note.share_status {
            ShareStatus::NeedShare => {
                self.sharing.share(ctx, tx, note.id, guid, None).await?;
                report.shared += 1;
            }
            ShareStatus::NeedStop => {
                self.sharing.stop_sharing(ctx, tx, note.id, guid).await?;
                report.shared += 1;
            }
            ShareStatus::None | ShareStatus::Shared => {}
        }
        Ok(())
    }
}

/// Bodies of the resources that go out with the note.
async fn resource_payloads(resources: &[ResourceRecord]) -> Vec<ResourcePayload> {
    let mut payloads = Vec::with_capacity(resources.len());
    for resource in resources {
        if resource.action == PendingAction::Delete {
            continue;
        }
        match tokio::fs::read(&resource.file_path).await {
            Ok(body) => payloads.push(ResourcePayload {
                guid: resource.guid.clone(),
                mime: resource.mime.clone(),
                file_name: resource.file_name.clone(),
                body_hash: resource.hash.clone(),
                body,
            }),
            Err(err) => warn!(
                resource_id = resource.id,
                path = %resource.file_path,
                "resource body unreadable, leaving it out: {err}"
            ),
        }
    }
    payloads
}

impl PushKind for NotePush {
    const KIND: EntityKind = EntityKind::Note;
    type Record = NoteRecord;

    async fn pending(tx: &mut StoreTx) -> Result<Vec<NoteRecord>, StoreError> {
        tx.pending_notes().await
    }

    fn local_id(record: &NoteRecord) -> i64 {
        record.id
    }

    async fn push_one<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        note: NoteRecord,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        match note.action {
            PendingAction::Delete => {
                if let Some(guid) = note.guid.as_deref()
                    && let RemoteOutcome::Rejected(err) =
                        classify(ctx.gateway.delete_note(guid).await)?
                {
                    warn!(note_id = note.id, "remote refused delete, dropping row: {err}");
                }
                for path in tx.delete_note(note.id).await? {
                    blobs.doom(path);
                }
                report.deleted += 1;
                return Ok(());
            }
            PendingAction::Create | PendingAction::Change => {
                self.push_content(ctx, tx, blobs, &note, report).await?;
            }
            PendingAction::None | PendingAction::Conflict | PendingAction::Duplicate => {}
        }
        Ok(())
    }

    async fn follow_up<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        note_id: i64,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        self.apply_share_request(ctx, tx, note_id, report).await
    }

    async fn merge_duplicates(
        &self,
        _tx: &mut StoreTx,
        _report: &mut PushReport,
    ) -> Result<(), SyncError> {
        Ok(())
    }
}
