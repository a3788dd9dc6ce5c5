use std::sync::{Arc, Mutex};
use std::time::Duration;

use notesync_core::{EntityKind, GatewayError, RemoteNote, RemoteResource};
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::config::SyncConfig;
use super::context::{SyncEvent, SyncObserver, SyncPhase, SyncStatus};
use super::model::{NoteInput, NoteRecord, NotebookRecord, PendingAction, ShareStatus};
use super::orchestrator::{CycleOutcome, CycleSummary, SyncOrchestrator};
use super::store::LocalStore;
use super::testing::{FAKE_NOW, FakeRemote};

mod cycle;
mod pull;
mod push;
mod worker;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<SyncEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }

    fn phases(&self) -> Vec<SyncPhase> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SyncEvent::Phase(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl SyncObserver for Recorder {
    fn on_event(&self, event: &SyncEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct Harness {
    orchestrator: SyncOrchestrator<FakeRemote>,
    recorder: Arc<Recorder>,
    blob_dir: TempDir,
}

impl Harness {
    async fn new(remote: FakeRemote) -> Self {
        Self::with_config(remote, |_| {}).await
    }

    async fn with_config(remote: FakeRemote, tweak: impl FnOnce(&mut SyncConfig)) -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = LocalStore::from_pool(pool);
        store.init().await.unwrap();
        let blob_dir = tempfile::tempdir().unwrap();
        let mut config = SyncConfig::new(blob_dir.path());
        tweak(&mut config);
        let recorder = Arc::new(Recorder::default());
        let orchestrator = SyncOrchestrator::new(remote, store, config)
            .with_observer(Arc::clone(&recorder) as Arc<dyn SyncObserver>);
        Self {
            orchestrator,
            recorder,
            blob_dir,
        }
    }

    fn remote(&self) -> &FakeRemote {
        self.orchestrator.gateway()
    }

    fn store(&self) -> &LocalStore {
        self.orchestrator.store()
    }

    async fn cycle(&self) -> CycleOutcome {
        self.orchestrator
            .run_cycle(false, &CancellationToken::new())
            .await
            .unwrap()
    }

    async fn force(&self) -> CycleOutcome {
        self.orchestrator
            .run_cycle(true, &CancellationToken::new())
            .await
            .unwrap()
    }

    async fn completed(&self) -> CycleSummary {
        match self.cycle().await {
            CycleOutcome::Completed(summary) => summary,
            other => panic!("cycle did not complete: {other:?}"),
        }
    }

    async fn notebooks(&self) -> Vec<NotebookRecord> {
        let mut tx = self.store().begin().await.unwrap();
        tx.list_notebooks().await.unwrap()
    }

    async fn remote_notebooks(&self) -> Vec<NotebookRecord> {
        self.notebooks()
            .await
            .into_iter()
            .filter(|nb| nb.guid.is_some())
            .collect()
    }

    async fn notes(&self) -> Vec<NoteRecord> {
        let mut tx = self.store().begin().await.unwrap();
        tx.list_notes().await.unwrap()
    }

    async fn note_by_guid(&self, guid: &str) -> Option<NoteRecord> {
        let mut tx = self.store().begin().await.unwrap();
        tx.note_by_guid(guid).await.unwrap()
    }
}

fn rate_limited(secs: u64) -> GatewayError {
    GatewayError::RateLimited {
        retry_after: Duration::from_secs(secs),
    }
}

/// Lets the next cycle run without waiting out a recorded rate limit.
async fn clear_rate_limit(harness: &Harness) {
    let mut tx = harness.store().begin().await.unwrap();
    let mut state = tx.load_sync_state().await.unwrap();
    state.rate_limit_until = None;
    tx.save_sync_state(&state).await.unwrap();
    tx.commit().await.unwrap();
}

fn remote_note(guid: &str, title: &str, notebook_guid: Option<&str>, updated: i64, usn: i64) -> RemoteNote {
    RemoteNote {
        guid: Some(guid.to_string()),
        title: title.to_string(),
        content: Some(format!("<p>{title}</p>")),
        created: FAKE_NOW,
        updated,
        notebook_guid: notebook_guid.map(str::to_string),
        usn,
        ..RemoteNote::default()
    }
}

fn remote_resource(guid: &str, file_name: &str, body: &[u8]) -> RemoteResource {
    RemoteResource {
        guid: Some(guid.to_string()),
        mime: "text/plain".to_string(),
        file_name: Some(file_name.to_string()),
        body_hash: super::blobs::md5_hex(body),
        ..RemoteResource::default()
    }
}

fn local_note(guid: Option<&str>, title: &str, updated: i64, action: PendingAction) -> NoteInput {
    NoteInput {
        guid: guid.map(str::to_string),
        title: title.to_string(),
        content: String::new(),
        created: FAKE_NOW,
        updated,
        updated_local: None,
        notebook_id: None,
        usn: guid.map(|_| 1),
        action,
        conflict_parent_id: None,
        share_date: None,
        place: None,
    }
}
