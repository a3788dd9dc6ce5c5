use std::time::Duration;

use super::super::config::SyncInterval;
use super::super::worker::{SyncWorker, WorkerError};
use super::*;

async fn spawn_manual(remote: FakeRemote) -> (SyncWorker, TempDir) {
    let harness = Harness::with_config(remote, |config| {
        config.interval = SyncInterval::Manual;
        config.idle_pause = Duration::from_millis(10);
        config.connect_retry = Duration::from_millis(10);
    })
    .await;
    let Harness {
        orchestrator,
        blob_dir,
        ..
    } = harness;
    (SyncWorker::spawn(Arc::new(orchestrator)), blob_dir)
}

#[tokio::test]
async fn force_sync_runs_cycle_on_worker() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 4, true);
    let (worker, _blobs) = spawn_manual(remote).await;
    let handle = worker.handle();
    let mut status = handle.subscribe_status();

    handle.force_sync().unwrap();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.local_usn == 4))
        .await
        .unwrap()
        .unwrap();
    assert!(handle.status().last_sync.is_some());

    handle.stop();
    tokio::time::timeout(Duration::from_secs(5), worker.wait())
        .await
        .unwrap();
    assert_eq!(handle.sync_now(), Err(WorkerError::Stopped));
}

#[tokio::test]
async fn worker_retries_after_connect_error() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 2, true);
    remote.fail_on(
        "get_sync_summary",
        1,
        GatewayError::Unavailable("offline".to_string()),
    );
    let (worker, _blobs) = spawn_manual(remote).await;
    let handle = worker.handle();
    let mut status = handle.subscribe_status();

    handle.sync_now().unwrap();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| {
        s.local_usn == 2 && s.status == SyncStatus::Idle
    }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.status().status, SyncStatus::Idle);

    handle.stop();
    worker.wait().await;
}

#[tokio::test]
async fn timer_interval_triggers_cycles() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 3, true);
    let (worker, _blobs) = spawn_manual(remote).await;
    let handle = worker.handle();
    let mut status = handle.subscribe_status();

    handle
        .set_interval(SyncInterval::Every(Duration::from_millis(20)))
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.local_usn == 3))
        .await
        .unwrap()
        .unwrap();

    handle.stop();
    worker.wait().await;
}

#[tokio::test]
async fn cancel_without_running_cycle_is_harmless() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    let (worker, _blobs) = spawn_manual(remote).await;
    let handle = worker.handle();
    let mut status = handle.subscribe_status();

    handle.cancel();
    handle.sync_now().unwrap();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| s.local_usn == 1))
        .await
        .unwrap()
        .unwrap();

    handle.stop();
    worker.wait().await;
}
