use std::collections::HashSet;
use std::future::Future;

use notesync_core::{
    EntityKind, RemoteGateway, RemoteLinkedNotebook, RemoteNotebook, RemoteSavedSearch, RemoteTag,
    SyncChunk, Usn,
};
use tracing::debug;

use super::blobs::BlobJournal;
use super::context::{CycleContext, settle};
use super::cursor::ChangeCursor;
use super::error::SyncError;
use super::model::{NotebookInput, NotebookRecord, PendingAction};
use super::store::StoreTx;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    pub created: u64,
    pub updated: u64,
    pub conflicts: u64,
    pub removed: u64,
    pub skipped: u64,
}

impl PullReport {
    pub fn changed(&self) -> bool {
        self.created + self.updated + self.conflicts + self.removed > 0
    }

    pub fn absorb(&mut self, other: &PullReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.conflicts += other.conflicts;
        self.removed += other.removed;
        self.skipped += other.skipped;
    }
}

/// How far one kind got within the current cycle. Only committed batches
/// are recorded, so a resumed pull never re-applies or skips a batch.
#[derive(Debug, Clone, Default)]
pub struct KindProgress {
    pub after_usn: Usn,
    pub seen: HashSet<i64>,
    pub report: PullReport,
    pub pruned: bool,
}

impl KindProgress {
    pub fn starting_at(after_usn: Usn) -> Self {
        Self {
            after_usn,
            ..Self::default()
        }
    }
}

/// Per-kind rules for applying remote records to the local store.
pub trait PullKind: Send + Sync {
    const KIND: EntityKind;
    type Record: Send;

    fn take_records(chunk: &mut SyncChunk) -> Vec<Self::Record>;

    fn remote_guid(record: &Self::Record) -> Option<&str>;

    /// Applies one record and returns the local id it maps to.
    fn apply<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        record: Self::Record,
        report: &mut PullReport,
    ) -> impl Future<Output = Result<Option<i64>, SyncError>> + Send;

    fn expunge<G: RemoteGateway>(
        &self,
        ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        guid: &str,
        report: &mut PullReport,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    /// Drops rows without pending work that a full pull did not see.
    fn prune(
        &self,
        tx: &mut StoreTx,
        blobs: &mut BlobJournal,
        seen: &HashSet<i64>,
    ) -> impl Future<Output = Result<u64, SyncError>> + Send;
}

/// Pulls one kind from `progress.after_usn` to the cycle's upper USN.
///
/// Every batch is applied and committed in its own transaction.
pub async fn pull_kind<G: RemoteGateway, K: PullKind>(
    ctx: &CycleContext<'_, G>,
    kind: &K,
    progress: &mut KindProgress,
) -> Result<(), SyncError> {
    let mut cursor = ChangeCursor::new(
        ctx.gateway,
        K::KIND,
        progress.after_usn,
        ctx.upto,
        ctx.config.batch_size,
    );
    loop {
        ctx.check_cancelled()?;
        let Some(mut batch) = cursor.next_batch().await? else {
            break;
        };
        let mut tx = ctx.store.begin().await?;
        let mut blobs = BlobJournal::new();
        let mut report = PullReport::default();
        let mut seen = Vec::new();
        let result = apply_batch(
            ctx,
            kind,
            &mut tx,
            &mut blobs,
            &mut batch.chunk,
            &mut report,
            &mut seen,
        )
        .await;
        settle(tx, blobs, result).await?;

        progress.after_usn = batch.high_usn;
        progress.seen.extend(seen);
        progress.report.absorb(&report);
        debug!(
            kind = K::KIND.as_str(),
            high_usn = batch.high_usn,
            created = report.created,
            updated = report.updated,
            "applied change batch"
        );
    }

    if ctx.full && !progress.pruned {
        let mut tx = ctx.store.begin().await?;
        let mut blobs = BlobJournal::new();
        let result = kind.prune(&mut tx, &mut blobs, &progress.seen).await;
        let removed = settle(tx, blobs, result).await?;
        if removed > 0 {
            debug!(kind = K::KIND.as_str(), removed, "pruned entities missing remotely");
        }
        progress.report.removed += removed;
        progress.pruned = true;
    }
    Ok(())
}

async fn apply_batch<G: RemoteGateway, K: PullKind>(
    ctx: &CycleContext<'_, G>,
    kind: &K,
    tx: &mut StoreTx,
    blobs: &mut BlobJournal,
    chunk: &mut SyncChunk,
    report: &mut PullReport,
    seen: &mut Vec<i64>,
) -> Result<(), SyncError> {
    for record in K::take_records(chunk) {
        // An unset guid ends the batch.
        if K::remote_guid(&record).is_none_or(str::is_empty) {
            break;
        }
        ctx.check_cancelled()?;
        if let Some(id) = kind.apply(ctx, tx, blobs, record, report).await? {
            seen.push(id);
        }
    }
    for guid in std::mem::take(&mut chunk.expunged) {
        kind.expunge(ctx, tx, blobs, &guid, report).await?;
    }
    Ok(())
}

fn notebook_is_newer(remote: &RemoteNotebook, local: &NotebookRecord) -> bool {
    match (remote.service_updated, local.service_updated) {
        (Some(remote_updated), Some(local_updated)) => remote_updated > local_updated,
        _ => remote.usn > local.usn.unwrap_or(0),
    }
}

pub struct NotebookPull;

impl PullKind for NotebookPull {
    const KIND: EntityKind = EntityKind::Notebook;
    type Record = RemoteNotebook;

    fn take_records(chunk: &mut SyncChunk) -> Vec<RemoteNotebook> {
        std::mem::take(&mut chunk.notebooks)
    }

    fn remote_guid(record: &RemoteNotebook) -> Option<&str> {
        record.guid.as_deref()
    }

    async fn apply<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        remote: RemoteNotebook,
        report: &mut PullReport,
    ) -> Result<Option<i64>, SyncError> {
        let Some(guid) = remote.guid.as_deref() else {
            return Ok(None);
        };
        let (id, pending_delete) = match tx.notebook_by_guid(guid).await? {
            None => {
                let id = tx
                    .insert_notebook(&NotebookInput {
                        guid: Some(guid.to_string()),
                        name: remote.name.clone(),
                        stack: remote.stack.clone(),
                        usn: Some(remote.usn),
                        service_created: remote.service_created,
                        service_updated: remote.service_updated,
                        action: PendingAction::None,
                    })
                    .await?;
                report.created += 1;
                (id, false)
            }
            Some(local) => {
                if !notebook_is_newer(&remote, &local) {
                    // already current
                } else if local.action == PendingAction::None {
                    tx.update_notebook_from_remote(local.id, &remote).await?;
                    report.updated += 1;
                } else {
                    debug!(notebook_id = local.id, "local notebook change pending, keeping it");
                    report.skipped += 1;
                }
                (local.id, local.action == PendingAction::Delete)
            }
        };
        if remote.default_notebook && !pending_delete {
            tx.set_default_notebook(id).await?;
        }
        Ok(Some(id))
    }

    async fn expunge<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        guid: &str,
        report: &mut PullReport,
    ) -> Result<(), SyncError> {
        let Some(local) = tx.notebook_by_guid(guid).await? else {
            return Ok(());
        };
        match local.action {
            PendingAction::None | PendingAction::Delete => {
                tx.delete_notebook(local.id).await?;
                report.removed += 1;
            }
            _ => tx.detach_notebook(local.id).await?,
        }
        Ok(())
    }

    async fn prune(
        &self,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        seen: &HashSet<i64>,
    ) -> Result<u64, SyncError> {
        Ok(tx.prune_notebooks(seen).await?)
    }
}

pub struct TagPull;

impl PullKind for TagPull {
    const KIND: EntityKind = EntityKind::Tag;
    type Record = RemoteTag;

    fn take_records(chunk: &mut SyncChunk) -> Vec<RemoteTag> {
        std::mem::take(&mut chunk.tags)
    }

    fn remote_guid(record: &RemoteTag) -> Option<&str> {
        record.guid.as_deref()
    }

    async fn apply<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        remote: RemoteTag,
        report: &mut PullReport,
    ) -> Result<Option<i64>, SyncError> {
        let Some(guid) = remote.guid.as_deref() else {
            return Ok(None);
        };
        let Some(local) = tx.tag_by_guid(guid).await? else {
            let id = tx
                .insert_tag(
                    Some(guid),
                    &remote.name,
                    remote.parent_guid.as_deref(),
                    Some(remote.usn),
                    PendingAction::None,
                )
                .await?;
            report.created += 1;
            return Ok(Some(id));
        };
        if remote.usn <= local.usn.unwrap_or(0) {
            return Ok(Some(local.id));
        }
        if local.action == PendingAction::None {
            tx.update_tag_from_remote(local.id, &remote).await?;
            report.updated += 1;
        } else {
            debug!(tag_id = local.id, "local tag change pending, keeping it");
            report.skipped += 1;
        }
        Ok(Some(local.id))
    }

    async fn expunge<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        guid: &str,
        report: &mut PullReport,
    ) -> Result<(), SyncError> {
        let Some(local) = tx.tag_by_guid(guid).await? else {
            return Ok(());
        };
        match local.action {
            PendingAction::None | PendingAction::Delete => {
                tx.delete_tag(local.id).await?;
                report.removed += 1;
            }
            _ => tx.detach_tag(local.id).await?,
        }
        Ok(())
    }

    async fn prune(
        &self,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        seen: &HashSet<i64>,
    ) -> Result<u64, SyncError> {
        Ok(tx.prune_tags(seen).await?)
    }
}

pub struct SearchPull;

impl PullKind for SearchPull {
    const KIND: EntityKind = EntityKind::SavedSearch;
    type Record = RemoteSavedSearch;

    fn take_records(chunk: &mut SyncChunk) -> Vec<RemoteSavedSearch> {
        std::mem::take(&mut chunk.searches)
    }

    fn remote_guid(record: &RemoteSavedSearch) -> Option<&str> {
        record.guid.as_deref()
    }

    async fn apply<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        remote: RemoteSavedSearch,
        report: &mut PullReport,
    ) -> Result<Option<i64>, SyncError> {
        let Some(guid) = remote.guid.as_deref() else {
            return Ok(None);
        };
        let existing = tx.saved_search_by_guid(guid).await?;
        if let Some(local) = &existing
            && remote.usn <= local.usn.unwrap_or(0)
        {
            return Ok(Some(local.id));
        }
        let id = tx.upsert_saved_search(&remote).await?;
        if existing.is_some() {
            report.updated += 1;
        } else {
            report.created += 1;
        }
        Ok(Some(id))
    }

    async fn expunge<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        guid: &str,
        report: &mut PullReport,
    ) -> Result<(), SyncError> {
        if let Some(local) = tx.saved_search_by_guid(guid).await? {
            tx.delete_saved_search(local.id).await?;
            report.removed += 1;
        }
        Ok(())
    }

    async fn prune(
        &self,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        seen: &HashSet<i64>,
    ) -> Result<u64, SyncError> {
        Ok(tx.prune_saved_searches(seen).await?)
    }
}

pub struct LinkedNotebookPull;

impl PullKind for LinkedNotebookPull {
    const KIND: EntityKind = EntityKind::LinkedNotebook;
    type Record = RemoteLinkedNotebook;

    fn take_records(chunk: &mut SyncChunk) -> Vec<RemoteLinkedNotebook> {
        std::mem::take(&mut chunk.linked_notebooks)
    }

    fn remote_guid(record: &RemoteLinkedNotebook) -> Option<&str> {
        record.guid.as_deref()
    }

    async fn apply<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        remote: RemoteLinkedNotebook,
        report: &mut PullReport,
    ) -> Result<Option<i64>, SyncError> {
        let Some(guid) = remote.guid.as_deref() else {
            return Ok(None);
        };
        let existing = tx.linked_notebook_by_guid(guid).await?;
        if let Some(local) = &existing
            && remote.usn <= local.usn.unwrap_or(0)
        {
            return Ok(Some(local.id));
        }
        let id = tx.upsert_linked_notebook(&remote).await?;
        if existing.is_some() {
            report.updated += 1;
        } else {
            report.created += 1;
        }
        Ok(Some(id))
    }

    async fn expunge<G: RemoteGateway>(
        &self,
        _ctx: &CycleContext<'_, G>,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        guid: &str,
        report: &mut PullReport,
    ) -> Result<(), SyncError> {
        if let Some(local) = tx.linked_notebook_by_guid(guid).await? {
            tx.delete_linked_notebook(local.id).await?;
            report.removed += 1;
        }
        Ok(())
    }

    async fn prune(
        &self,
        tx: &mut StoreTx,
        _blobs: &mut BlobJournal,
        seen: &HashSet<i64>,
    ) -> Result<u64, SyncError> {
        Ok(tx.prune_linked_notebooks(seen).await?)
    }
}
