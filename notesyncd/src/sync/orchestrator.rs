use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use notesync_core::{EntityKind, RemoteGateway, Usn};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::config::SyncConfig;
use super::context::{
    CycleContext, EventHub, StatusSnapshot, SyncEvent, SyncObserver, SyncPhase, SyncStatus,
};
use super::error::SyncError;
use super::model::now_millis;
use super::pull::{
    KindProgress, LinkedNotebookPull, NotebookPull, PullKind, PullReport, SearchPull, TagPull,
    pull_kind,
};
use super::pull_notes::NotePull;
use super::push::{NotebookPush, PushKind, PushReport, TagPush, push_kind};
use super::push_notes::NotePush;
use super::store::LocalStore;

/// Work done so far by an interrupted cycle.
#[derive(Debug, Clone)]
struct CycleProgress {
    full: bool,
    since: Usn,
    upto: Usn,
    needs_fetch: bool,
    kinds: HashMap<EntityKind, KindProgress>,
    pulled: HashSet<EntityKind>,
    pushed: HashSet<EntityKind>,
    push_report: PushReport,
}

impl CycleProgress {
    fn new(full: bool, since: Usn, upto: Usn, needs_fetch: bool) -> Self {
        Self {
            full,
            since,
            upto,
            needs_fetch,
            kinds: HashMap::new(),
            pulled: HashSet::new(),
            pushed: HashSet::new(),
            push_report: PushReport::default(),
        }
    }

    fn pull_report(&self) -> PullReport {
        let mut total = PullReport::default();
        for progress in self.kinds.values() {
            total.absorb(&progress.report);
        }
        total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub full: bool,
    pub local_usn: Usn,
    pub pulled: PullReport,
    pub pushed: PushReport,
}

impl CycleSummary {
    pub fn changed(&self) -> bool {
        self.pulled.changed() || self.pushed.changed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    /// Paused; the next cycle resumes where this one stopped.
    RateLimited { retry_after: Duration },
    Unavailable { reason: String },
    Cancelled,
}

/// Owns the ordering of pulls and pushes and the persisted sync cursor.
pub struct SyncOrchestrator<G> {
    gateway: G,
    store: LocalStore,
    config: SyncConfig,
    events: EventHub,
    notes_pull: NotePull,
    notes_push: NotePush,
    // Held for the whole cycle; also keeps an interrupted cycle's progress.
    progress: Mutex<Option<CycleProgress>>,
}

impl<G: RemoteGateway> SyncOrchestrator<G> {
    pub fn new(gateway: G, store: LocalStore, config: SyncConfig) -> Self {
        Self {
            gateway,
            store,
            config,
            events: EventHub::new(),
            notes_pull: NotePull::default(),
            notes_push: NotePush::default(),
            progress: Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.events.add_observer(observer);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn status(&self) -> StatusSnapshot {
        self.events.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.events.subscribe()
    }

    /// Loads the persisted counters into the status snapshot.
    pub async fn publish_persisted_state(&self) -> Result<(), SyncError> {
        let state = self.store.sync_state().await?;
        self.events.publish_state(&state);
        Ok(())
    }

    /// Runs one cycle. Concurrent callers wait for the running cycle and
    /// then run their own.
    pub async fn run_cycle(
        &self,
        force_full: bool,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, SyncError> {
        let mut slot = self.progress.lock().await;

        let state = self.store.sync_state().await?;
        let now = now_millis();
        if let Some(until) = state.rate_limit_until
            && until > now
        {
            let retry_after = Duration::from_millis((until - now) as u64);
            self.events
                .set_status(SyncStatus::RateLimited { retry_after });
            return Ok(CycleOutcome::RateLimited { retry_after });
        }

        self.events.set_status(SyncStatus::Syncing);
        self.events.emit(SyncEvent::Phase(SyncPhase::Start));

        let mut progress = match slot.take() {
            Some(progress) if !force_full => {
                info!(
                    since = progress.since,
                    upto = progress.upto,
                    "resuming interrupted sync cycle"
                );
                progress
            }
            _ => match self.plan_cycle(force_full).await {
                Ok(progress) => progress,
                Err(err) => return self.interrupted(&mut slot, None, err).await,
            },
        };

        let ctx = CycleContext {
            gateway: &self.gateway,
            store: &self.store,
            config: &self.config,
            events: &self.events,
            cancel,
            full: progress.full,
            upto: progress.upto,
        };
        match self.run_phases(&ctx, &mut progress).await {
            Ok(summary) => {
                self.events.set_status(SyncStatus::Idle);
                Ok(CycleOutcome::Completed(summary))
            }
            Err(err) => self.interrupted(&mut slot, Some(progress), err).await,
        }
    }

    async fn plan_cycle(&self, force_full: bool) -> Result<CycleProgress, SyncError> {
        let summary = self.gateway.get_sync_summary().await?;
        let mut tx = self.store.begin().await?;
        let mut state = tx.load_sync_state().await?;
        state.remote_usn = summary.update_count;
        state.server_time = Some(summary.current_time);
        state.full_sync_before = summary.full_sync_before;
        state.uploaded_bytes = summary.uploaded_bytes;
        if force_full && self.config.full_sync_on_force {
            state.need_full_sync = true;
        }
        let stale = self.config.honor_full_sync_before
            && summary.full_sync_before > state.last_sync.unwrap_or(0);
        let full = state.need_full_sync || stale || state.local_usn == 0;
        let needs_fetch = full || force_full || summary.update_count > state.local_usn;
        tx.save_sync_state(&state).await?;
        tx.commit().await?;
        self.events.publish_state(&state);

        let since = if full { 0 } else { state.local_usn };
        info!(
            full,
            needs_fetch,
            since,
            upto = summary.update_count,
            "starting sync cycle"
        );
        Ok(CycleProgress::new(
            full,
            since,
            summary.update_count,
            needs_fetch,
        ))
    }

    async fn run_phases(
        &self,
        ctx: &CycleContext<'_, G>,
        progress: &mut CycleProgress,
    ) -> Result<CycleSummary, SyncError> {
        if progress.needs_fetch {
            self.pull_step(ctx, progress, &NotebookPull, SyncPhase::NotebooksPulled)
                .await?;
            self.pull_step(ctx, progress, &TagPull, SyncPhase::TagsPulled)
                .await?;
            self.pull_step(ctx, progress, &self.notes_pull, SyncPhase::NotesPulled)
                .await?;
            self.pull_step(
                ctx,
                progress,
                &LinkedNotebookPull,
                SyncPhase::LinkedNotebooksPulled,
            )
            .await?;
            self.pull_step(ctx, progress, &SearchPull, SyncPhase::SearchesPulled)
                .await?;
        }

        self.push_step(ctx, progress, &NotebookPush, SyncPhase::NotebooksPushed)
            .await?;
        self.push_step(ctx, progress, &TagPush, SyncPhase::TagsPushed)
            .await?;
        self.push_step(ctx, progress, &self.notes_push, SyncPhase::NotesPushed)
            .await?;

        let mut tx = self.store.begin().await?;
        let mut state = tx.load_sync_state().await?;
        state.local_usn = progress.upto;
        state.remote_usn = state.remote_usn.max(progress.upto);
        state.last_sync = Some(now_millis());
        state.need_full_sync = false;
        state.rate_limit_until = None;
        state.connect_error_count = 0;
        tx.save_sync_state(&state).await?;
        tx.commit().await?;
        self.events.publish_state(&state);

        let summary = CycleSummary {
            full: progress.full,
            local_usn: state.local_usn,
            pulled: progress.pull_report(),
            pushed: progress.push_report,
        };
        if summary.changed() {
            self.events.emit(SyncEvent::DataChanged);
        }
        self.events.emit(SyncEvent::Phase(SyncPhase::Finish));
        info!(
            local_usn = summary.local_usn,
            created = summary.pulled.created,
            updated = summary.pulled.updated,
            conflicts = summary.pulled.conflicts,
            pushed = summary.pushed.created + summary.pushed.updated,
            "sync cycle finished"
        );
        Ok(summary)
    }

    async fn pull_step<K: PullKind>(
        &self,
        ctx: &CycleContext<'_, G>,
        progress: &mut CycleProgress,
        kind: &K,
        phase: SyncPhase,
    ) -> Result<(), SyncError> {
        if progress.pulled.contains(&K::KIND) {
            return Ok(());
        }
        let since = progress.since;
        let entry = progress
            .kinds
            .entry(K::KIND)
            .or_insert_with(|| KindProgress::starting_at(since));
        pull_kind(ctx, kind, entry).await?;
        if K::KIND == EntityKind::Notebook {
            let mut tx = self.store.begin().await?;
            tx.ensure_default_notebook().await?;
            tx.commit().await?;
        }
        progress.pulled.insert(K::KIND);
        self.events.emit(SyncEvent::Phase(phase));
        Ok(())
    }

    async fn push_step<K: PushKind>(
        &self,
        ctx: &CycleContext<'_, G>,
        progress: &mut CycleProgress,
        kind: &K,
        phase: SyncPhase,
    ) -> Result<(), SyncError> {
        if progress.pushed.contains(&K::KIND) {
            return Ok(());
        }
        let report = push_kind(ctx, kind).await?;
        let total = &mut progress.push_report;
        total.created += report.created;
        total.updated += report.updated;
        total.deleted += report.deleted;
        total.rejected += report.rejected;
        total.duplicates += report.duplicates;
        total.merged += report.merged;
        total.shared += report.shared;
        progress.pushed.insert(K::KIND);
        self.events.emit(SyncEvent::Phase(phase));
        Ok(())
    }

    /// Records why the cycle stopped. Interruptions keep `progress` for the
    /// next cycle; other errors drop it and surface to the caller.
    async fn interrupted(
        &self,
        slot: &mut Option<CycleProgress>,
        progress: Option<CycleProgress>,
        err: SyncError,
    ) -> Result<CycleOutcome, SyncError> {
        match err {
            SyncError::RateLimited { retry_after } => {
                *slot = progress;
                let mut tx = self.store.begin().await?;
                let mut state = tx.load_sync_state().await?;
                let wait = i64::try_from(retry_after.as_millis()).unwrap_or(i64::MAX);
                state.rate_limit_until = Some(now_millis().saturating_add(wait));
                tx.save_sync_state(&state).await?;
                tx.commit().await?;
                warn!(
                    retry_after = retry_after.as_secs(),
                    "remote rate limit reached, pausing sync"
                );
                self.events
                    .set_status(SyncStatus::RateLimited { retry_after });
                Ok(CycleOutcome::RateLimited { retry_after })
            }
            SyncError::Unavailable(reason) => {
                *slot = progress;
                let mut tx = self.store.begin().await?;
                let mut state = tx.load_sync_state().await?;
                state.connect_error_count += 1;
                tx.save_sync_state(&state).await?;
                tx.commit().await?;
                warn!(
                    attempts = state.connect_error_count,
                    "remote service unavailable: {reason}"
                );
                self.events.set_status(SyncStatus::ConnectError {
                    attempts: state.connect_error_count,
                });
                Ok(CycleOutcome::Unavailable { reason })
            }
            SyncError::Cancelled => {
                *slot = progress;
                info!("sync cycle cancelled");
                self.events.set_status(SyncStatus::Idle);
                Ok(CycleOutcome::Cancelled)
            }
            other => {
                *slot = None;
                error!("sync cycle failed: {other}");
                self.events.set_status(SyncStatus::Idle);
                Err(other)
            }
        }
    }
}
