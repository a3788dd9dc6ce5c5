use std::future::Future;

use notesync_core::{EntityKind, GatewayError, NotebookPayload, RemoteGateway, TagPayload};
use tracing::{debug, info, warn};

use super::blobs::BlobJournal;
use super::context::{CycleContext, SyncEvent, settle};
use super::error::SyncError;
use super::model::{NotebookRecord, PendingAction, TagRecord};
use super::store::{StoreError, StoreTx};
use super::validate::{self, ValidationError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub rejected: u64,
    pub duplicates: u64,
    pub merged: u64,
    pub shared: u64,
}

impl PushReport {
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.deleted + self.duplicates + self.merged + self.shared
            > 0
    }
}

/// Per-kind translation of pending local records into remote calls.
pub trait PushKind: Send + Sync {
    const KIND: EntityKind;
    type Record: Send + Sync;

    fn pending(
        tx: &mut StoreTx,
    ) -> impl Future<Output = Result<Vec<Self::Record>, StoreError>> + Send;

    fn local_id(record: &Self::Record) -> i64;

    fn push_one<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        record: Self::Record,
        report: &mut PushReport,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Extra remote work for a record whose push is already committed.
    fn follow_up<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        _tx: &mut StoreTx,
        _local_id: i64,
        _report: &mut PushReport,
    ) -> impl Future<Output = Result<(), SyncError>> + Send {
        async { Ok(()) }
    }

    /// Folds records whose create collided with an existing remote name into
    /// the authoritative record.
    fn merge_duplicates(
        &self,
        tx: &mut StoreTx,
        report: &mut PushReport,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

/// Pushes every pending record of one kind.
///
/// Each record is committed right after its remote call, so an interruption
/// only leaves the records not reached yet. Follow-up calls run in a second
/// transaction and never roll back the push they depend on.
pub async fn push_kind<G: RemoteGateway, K: PushKind>(
    ctx: &CycleContext<'_, G>,
    kind: &K,
) -> Result<PushReport, SyncError> {
    let mut tx = ctx.store.begin().await?;
    let pending = K::pending(&mut tx).await.map_err(SyncError::from);
    let pending = settle(tx, BlobJournal::new(), pending).await?;

    let mut report = PushReport::default();
    for record in pending {
        ctx.check_cancelled()?;
        let local_id = K::local_id(&record);
        let mut tx = ctx.store.begin().await?;
        let mut blobs = BlobJournal::new();
        let result = kind
            .push_one(ctx, &mut tx, &mut blobs, record, &mut report)
            .await;
        if let Err(err) = &result
            && !err.is_interruption()
        {
            warn!(kind = K::KIND.as_str(), local_id, "push failed: {err}");
        }
        settle(tx, blobs, result).await?;

        let mut tx = ctx.store.begin().await?;
        let result = kind.follow_up(ctx, &mut tx, local_id, &mut report).await;
        if let Err(err) = &result
            && !err.is_interruption()
        {
            warn!(kind = K::KIND.as_str(), local_id, "push follow-up failed: {err}");
        }
        settle(tx, BlobJournal::new(), result).await?;
    }

    let mut tx = ctx.store.begin().await?;
    let result = kind.merge_duplicates(&mut tx, &mut report).await;
    settle(tx, BlobJournal::new(), result).await?;
    Ok(report)
}

/// Remote call result as far as the push rules care.
pub(crate) enum RemoteOutcome<T> {
    Done(T),
    Duplicate,
    NotFound,
    Rejected(GatewayError),
}

/// Interruptions and auth failures stay errors; the rest become outcomes.
pub(crate) fn classify<T>(result: Result<T, GatewayError>) -> Result<RemoteOutcome<T>, SyncError> {
    match result {
        Ok(value) => Ok(RemoteOutcome::Done(value)),
        Err(GatewayError::Duplicate(_)) => Ok(RemoteOutcome::Duplicate),
        Err(GatewayError::NotFound(_)) => Ok(RemoteOutcome::NotFound),
        Err(err @ GatewayError::Rejected(_)) => Ok(RemoteOutcome::Rejected(err)),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn report_invalid<G: RemoteGateway>(
    ctx: &CycleContext<'_, G>,
    kind: EntityKind,
    local_id: i64,
    err: &ValidationError,
    report: &mut PushReport,
) {
    warn!(kind = kind.as_str(), local_id, "dropping local change: {err}");
    ctx.emit(SyncEvent::ValidationFailed {
        kind,
        local_id,
        reason: err.to_string(),
    });
    report.rejected += 1;
}

fn notebook_payload(record: &NotebookRecord) -> Result<NotebookPayload, ValidationError> {
    let name = validate::notebook_name(&record.name)?;
    let stack = record
        .stack
        .as_deref()
        .filter(|stack| !stack.trim().is_empty())
        .map(validate::notebook_stack)
        .transpose()?;
    Ok(NotebookPayload {
        guid: record.guid.clone(),
        name,
        stack,
        default_notebook: record.is_default,
    })
}

pub struct NotebookPush;

impl PushKind for NotebookPush {
    const KIND: EntityKind = EntityKind::Notebook;
    type Record = NotebookRecord;

    async fn pending(tx: &mut StoreTx) -> Result<Vec<NotebookRecord>, StoreError> {
        tx.pending_notebooks().await
    }

    fn local_id(record: &NotebookRecord) -> i64 {
        record.id
    }

    async fn push_one<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        record: NotebookRecord,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        if record.action == PendingAction::Delete {
            if let Some(guid) = record.guid.as_deref()
                && let RemoteOutcome::Rejected(err) =
                    classify(ctx.gateway.delete_notebook(guid).await)?
            {
                warn!(notebook_id = record.id, "remote refused delete, dropping row: {err}");
            }
            tx.delete_notebook(record.id).await?;
            report.deleted += 1;
            return Ok(());
        }

        let mut payload = match notebook_payload(&record) {
            Ok(payload) => payload,
            Err(err) => {
                tx.set_notebook_action(record.id, PendingAction::None)
                    .await?;
                report_invalid(ctx, Self::KIND, record.id, &err, report);
                return Ok(());
            }
        };

        let updating = record.action == PendingAction::Change && record.guid.is_some();
        let mut created = !updating;
        let outcome = if updating {
            match classify(ctx.gateway.update_notebook(&payload).await)? {
                RemoteOutcome::NotFound => {
                    debug!(notebook_id = record.id, "notebook gone remotely, creating it again");
                    payload.guid = None;
                    created = true;
                    classify(ctx.gateway.create_notebook(&payload).await)?
                }
                other => other,
            }
        } else {
            payload.guid = None;
            classify(ctx.gateway.create_notebook(&payload).await)?
        };

        match outcome {
            RemoteOutcome::Done(remote) => {
                tx.mark_notebook_pushed(record.id, &remote).await?;
                if created {
                    report.created += 1;
                } else {
                    report.updated += 1;
                }
            }
            RemoteOutcome::Duplicate if created => {
                info!(notebook_id = record.id, name = %record.name, "notebook name already taken remotely");
                tx.set_notebook_action(record.id, PendingAction::Duplicate)
                    .await?;
                report.duplicates += 1;
            }
            RemoteOutcome::Duplicate => {
                warn!(notebook_id = record.id, "rename collides with another notebook, dropping change");
                tx.set_notebook_action(record.id, PendingAction::None)
                    .await?;
                report.rejected += 1;
            }
            RemoteOutcome::NotFound | RemoteOutcome::Rejected(_) => {
                warn!(notebook_id = record.id, "remote refused notebook, dropping change");
                tx.set_notebook_action(record.id, PendingAction::None)
                    .await?;
                report.rejected += 1;
            }
        }
        Ok(())
    }

    async fn merge_duplicates(
        &self,
        tx: &mut StoreTx,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        for duplicate in tx.duplicate_notebooks().await? {
            let target = match tx
                .find_authoritative_notebook(&duplicate.name, duplicate.id)
                .await?
            {
                Some(target) => target,
                None => tx.ensure_default_notebook().await?,
            };
            if target.id == duplicate.id {
                warn!(notebook_id = duplicate.id, "no merge target for duplicate notebook");
                tx.set_notebook_action(duplicate.id, PendingAction::None)
                    .await?;
                continue;
            }
            let moved = tx.reassign_notes(duplicate.id, target.id).await?;
            if duplicate.is_default {
                tx.set_default_notebook(target.id).await?;
            }
            tx.delete_notebook(duplicate.id).await?;
            info!(
                duplicate_id = duplicate.id,
                target_id = target.id,
                moved,
                "merged duplicate notebook"
            );
            report.merged += 1;
        }
        Ok(())
    }
}

pub struct TagPush;

impl PushKind for TagPush {
    const KIND: EntityKind = EntityKind::Tag;
    type Record = TagRecord;

    async fn pending(tx: &mut StoreTx) -> Result<Vec<TagRecord>, StoreError> {
        tx.pending_tags().await
    }

    fn local_id(record: &TagRecord) -> i64 {
        record.id
    }

    async fn push_one<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        record: TagRecord,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        if record.action == PendingAction::Delete {
            if let Some(guid) = record.guid.as_deref()
                && let RemoteOutcome::Rejected(err) = classify(ctx.gateway.delete_tag(guid).await)?
            {
                warn!(tag_id = record.id, "remote refused delete, dropping row: {err}");
            }
            tx.delete_tag(record.id).await?;
            report.deleted += 1;
            return Ok(());
        }

        let name = match validate::tag_name(&record.name) {
            Ok(name) => name,
            Err(err) => {
                tx.set_tag_action(record.id, PendingAction::None).await?;
                report_invalid(ctx, Self::KIND, record.id, &err, report);
                return Ok(());
            }
        };
        let mut payload = TagPayload {
            guid: record.guid.clone(),
            name,
            parent_guid: record.parent_guid.clone(),
        };

        let updating = record.action == PendingAction::Change && record.guid.is_some();
        let mut created = !updating;
        let outcome = if updating {
            match classify(ctx.gateway.update_tag(&payload).await)? {
                RemoteOutcome::NotFound => {
                    payload.guid = None;
                    created = true;
                    classify(ctx.gateway.create_tag(&payload).await)?
                }
                other => other,
            }
        } else {
            payload.guid = None;
            classify(ctx.gateway.create_tag(&payload).await)?
        };

        match outcome {
            RemoteOutcome::Done(remote) => {
                tx.mark_tag_pushed(record.id, &remote).await?;
                if created {
                    report.created += 1;
                } else {
                    report.updated += 1;
                }
            }
            RemoteOutcome::Duplicate if created => {
                info!(tag_id = record.id, name = %record.name, "tag name already taken remotely");
                tx.set_tag_action(record.id, PendingAction::Duplicate).await?;
                report.duplicates += 1;
            }
            RemoteOutcome::Duplicate | RemoteOutcome::NotFound | RemoteOutcome::Rejected(_) => {
                warn!(tag_id = record.id, "remote refused tag, dropping change");
                tx.set_tag_action(record.id, PendingAction::None).await?;
                report.rejected += 1;
            }
        }
        Ok(())
    }

    async fn merge_duplicates(
        &self,
        tx: &mut StoreTx,
        report: &mut PushReport,
    ) -> Result<(), SyncError> {
        for duplicate in tx.duplicate_tags().await? {
            match tx.find_authoritative_tag(&duplicate.name, duplicate.id).await? {
                Some(target) => {
                    tx.reassign_tag_links(duplicate.id, target.id).await?;
                    info!(duplicate_id = duplicate.id, target_id = target.id, "merged duplicate tag");
                }
                None => {
                    warn!(tag_id = duplicate.id, "no merge target for duplicate tag, dropping its links");
                }
            }
            tx.delete_tag(duplicate.id).await?;
            report.merged += 1;
        }
        Ok(())
    }
}
