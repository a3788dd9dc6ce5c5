use std::sync::Arc;
use std::time::Duration;

use notesync_core::{EntityKind, RemoteGateway, Usn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::blobs::BlobJournal;
use super::config::SyncConfig;
use super::error::SyncError;
use super::store::{LocalStore, StoreTx, SyncState};

/// Cycle boundaries reported to observers, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Start,
    NotebooksPulled,
    TagsPulled,
    NotesPulled,
    LinkedNotebooksPulled,
    SearchesPulled,
    NotebooksPushed,
    TagsPushed,
    NotesPushed,
    Finish,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncPhase::Start => "start",
            SyncPhase::NotebooksPulled => "notebooks-pulled",
            SyncPhase::TagsPulled => "tags-pulled",
            SyncPhase::NotesPulled => "notes-pulled",
            SyncPhase::LinkedNotebooksPulled => "linked-notebooks-pulled",
            SyncPhase::SearchesPulled => "searches-pulled",
            SyncPhase::NotebooksPushed => "notebooks-pushed",
            SyncPhase::TagsPushed => "tags-pushed",
            SyncPhase::NotesPushed => "notes-pushed",
            SyncPhase::Finish => "finish",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    RateLimited { retry_after: Duration },
    ConnectError { attempts: i64 },
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::RateLimited { .. } => "rate_limited",
            SyncStatus::ConnectError { .. } => "connect_error",
        }
    }

    pub fn detail(self) -> String {
        match self {
            SyncStatus::RateLimited { retry_after } => {
                format!("retry after {}s", retry_after.as_secs())
            }
            SyncStatus::ConnectError { attempts } => format!("{attempts} failed attempts"),
            SyncStatus::Idle | SyncStatus::Syncing => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Phase(SyncPhase),
    /// At most once per cycle, after something was committed locally.
    DataChanged,
    StatusChanged(SyncStatus),
    ValidationFailed {
        kind: EntityKind,
        local_id: i64,
        reason: String,
    },
    ConflictCreated {
        original: i64,
        copy: i64,
    },
}

pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Value published through the status watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    pub local_usn: Usn,
    pub remote_usn: Usn,
    pub last_sync: Option<i64>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            local_usn: 0,
            remote_usn: 0,
            last_sync: None,
        }
    }
}

pub struct EventHub {
    observers: Vec<Arc<dyn SyncObserver>>,
    status: watch::Sender<StatusSnapshot>,
}

impl EventHub {
    pub fn new() -> Self {
        let (status, _) = watch::channel(StatusSnapshot::default());
        Self {
            observers: Vec::new(),
            status,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SyncObserver>) {
        self.observers.push(observer);
    }

    pub fn emit(&self, event: SyncEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    pub fn set_status(&self, status: SyncStatus) {
        let changed = self.status.send_if_modified(|snapshot| {
            if snapshot.status == status {
                return false;
            }
            snapshot.status = status;
            true
        });
        if changed {
            self.emit(SyncEvent::StatusChanged(status));
        }
    }

    pub fn publish_state(&self, state: &SyncState) {
        self.status.send_modify(|snapshot| {
            snapshot.local_usn = state.local_usn;
            snapshot.remote_usn = state.remote_usn;
            snapshot.last_sync = state.last_sync;
        });
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one sync cycle needs, threaded through every engine call.
pub struct CycleContext<'a, G> {
    pub gateway: &'a G,
    pub store: &'a LocalStore,
    pub config: &'a SyncConfig,
    pub events: &'a EventHub,
    pub cancel: &'a CancellationToken,
    /// Full enumeration: pulls start at 0 and prune what was not seen.
    pub full: bool,
    pub upto: Usn,
}

impl<G: RemoteGateway> CycleContext<'_, G> {
    pub fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    pub fn emit(&self, event: SyncEvent) {
        self.events.emit(event);
    }
}

/// Commits or rolls back a transaction together with its blob journal.
pub async fn settle<T>(
    tx: StoreTx,
    blobs: BlobJournal,
    result: Result<T, SyncError>,
) -> Result<T, SyncError> {
    match result {
        Ok(value) => match tx.commit().await {
            Ok(()) => {
                blobs.commit().await;
                Ok(value)
            }
            Err(err) => {
                blobs.rollback().await;
                Err(err.into())
            }
        },
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("rollback failed: {rollback_err}");
            }
            blobs.rollback().await;
            Err(err)
        }
    }
}
