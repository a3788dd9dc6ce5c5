use super::*;

#[tokio::test]
async fn rate_limit_mid_pull_keeps_committed_batches_and_resumes() {
    let remote = FakeRemote::new();
    for usn in 1..=5 {
        remote.put_notebook(&format!("nb-{usn}"), &format!("Notebook {usn}"), usn, usn == 1);
    }
    remote.fail_on("fetch_changes", 3, rate_limited(60));
    let harness = Harness::with_config(remote, |config| config.batch_size = 1).await;

    let outcome = harness.cycle().await;
    assert_eq!(
        outcome,
        CycleOutcome::RateLimited {
            retry_after: Duration::from_secs(60)
        }
    );
    assert_eq!(harness.remote_notebooks().await.len(), 2);
    let state = harness.store().sync_state().await.unwrap();
    assert_eq!(state.local_usn, 0);
    assert!(state.rate_limit_until.is_some());
    assert!(matches!(
        harness.orchestrator.status().status,
        SyncStatus::RateLimited { .. }
    ));

    clear_rate_limit(&harness).await;
    let summary = harness.completed().await;
    assert_eq!(summary.local_usn, 5);
    assert_eq!(summary.pulled.created, 5);

    let notebooks = harness.notebooks().await;
    assert_eq!(notebooks.len(), 5);
    let mut guids: Vec<String> = notebooks.into_iter().filter_map(|nb| nb.guid).collect();
    guids.sort();
    guids.dedup();
    assert_eq!(guids.len(), 5);
    // The resumed cycle reuses the original plan.
    assert_eq!(harness.remote().calls("get_sync_summary"), 1);
    assert_eq!(harness.orchestrator.status().status, SyncStatus::Idle);
}

#[tokio::test]
async fn pending_rate_limit_blocks_next_cycle() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    remote.fail_on("get_sync_summary", 1, rate_limited(120));
    let harness = Harness::new(remote).await;

    assert!(matches!(
        harness.cycle().await,
        CycleOutcome::RateLimited { .. }
    ));
    let outcome = harness.cycle().await;
    let CycleOutcome::RateLimited { retry_after } = outcome else {
        panic!("expected the gate to hold: {outcome:?}");
    };
    assert!(retry_after <= Duration::from_secs(120));
    assert_eq!(harness.remote().calls("get_sync_summary"), 1);

    clear_rate_limit(&harness).await;
    assert_eq!(harness.completed().await.local_usn, 1);
}

#[tokio::test]
async fn rate_limit_during_push_keeps_pushed_records() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    {
        let mut tx = harness.store().begin().await.unwrap();
        tx.create_local_notebook("Alpha", None).await.unwrap();
        tx.create_local_notebook("Beta", None).await.unwrap();
        tx.commit().await.unwrap();
    }
    harness.remote().fail_on("create_notebook", 2, rate_limited(30));

    assert!(matches!(
        harness.cycle().await,
        CycleOutcome::RateLimited { .. }
    ));
    let notebooks = harness.notebooks().await;
    let alpha = notebooks.iter().find(|nb| nb.name == "Alpha").unwrap();
    let beta = notebooks.iter().find(|nb| nb.name == "Beta").unwrap();
    assert!(alpha.guid.is_some());
    assert_eq!(beta.action, PendingAction::Create);

    clear_rate_limit(&harness).await;
    harness.completed().await;
    assert_eq!(harness.remote_notebooks().await.len(), 3);
    assert_eq!(harness.remote().calls("create_notebook"), 3);
}

#[tokio::test]
async fn unavailable_remote_counts_connect_errors() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    remote.fail_on(
        "get_sync_summary",
        1,
        GatewayError::Unavailable("connection refused".to_string()),
    );
    remote.fail_on(
        "get_sync_summary",
        2,
        GatewayError::Unavailable("connection refused".to_string()),
    );
    let harness = Harness::new(remote).await;

    assert!(matches!(
        harness.cycle().await,
        CycleOutcome::Unavailable { .. }
    ));
    assert!(matches!(
        harness.cycle().await,
        CycleOutcome::Unavailable { .. }
    ));
    assert_eq!(
        harness.orchestrator.status().status,
        SyncStatus::ConnectError { attempts: 2 }
    );
    assert_eq!(harness.store().sync_state().await.unwrap().connect_error_count, 2);

    harness.completed().await;
    assert_eq!(harness.store().sync_state().await.unwrap().connect_error_count, 0);
    assert_eq!(harness.orchestrator.status().status, SyncStatus::Idle);
}

#[tokio::test]
async fn phases_are_reported_in_order() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    assert_eq!(
        harness.recorder.phases(),
        vec![
            SyncPhase::Start,
            SyncPhase::NotebooksPulled,
            SyncPhase::TagsPulled,
            SyncPhase::NotesPulled,
            SyncPhase::LinkedNotebooksPulled,
            SyncPhase::SearchesPulled,
            SyncPhase::NotebooksPushed,
            SyncPhase::TagsPushed,
            SyncPhase::NotesPushed,
            SyncPhase::Finish,
        ]
    );
    let events = harness.recorder.events();
    assert_eq!(
        events
            .iter()
            .filter(|event| **event == SyncEvent::DataChanged)
            .count(),
        1
    );
    assert!(events.contains(&SyncEvent::StatusChanged(SyncStatus::Syncing)));
    assert_eq!(
        events.last(),
        Some(&SyncEvent::StatusChanged(SyncStatus::Idle))
    );
}

#[tokio::test]
async fn quiet_cycle_skips_pull_and_data_changed() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;
    harness.recorder.clear();

    let summary = harness.completed().await;
    assert!(!summary.changed());
    assert_eq!(
        harness.recorder.phases(),
        vec![
            SyncPhase::Start,
            SyncPhase::NotebooksPushed,
            SyncPhase::TagsPushed,
            SyncPhase::NotesPushed,
            SyncPhase::Finish,
        ]
    );
    assert!(!harness.recorder.events().contains(&SyncEvent::DataChanged));
}

#[tokio::test]
async fn cancelled_cycle_leaves_cursor_in_place() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    let harness = Harness::new(remote).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = harness.orchestrator.run_cycle(false, &cancel).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Cancelled);
    assert_eq!(harness.store().sync_state().await.unwrap().local_usn, 0);
    assert_eq!(harness.orchestrator.status().status, SyncStatus::Idle);

    assert_eq!(harness.completed().await.local_usn, 1);
}

#[tokio::test]
async fn server_full_sync_threshold_triggers_full_pull() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    harness.remote().set_full_sync_before(i64::MAX);
    let summary = harness.completed().await;
    assert!(summary.full);

    let ignoring = Harness::with_config(FakeRemote::new(), |config| {
        config.honor_full_sync_before = false;
    })
    .await;
    ignoring.remote().put_notebook("nb-1", "One", 1, true);
    ignoring.completed().await;
    ignoring.remote().set_full_sync_before(i64::MAX);
    assert!(!ignoring.completed().await.full);
}

#[tokio::test]
async fn fatal_error_drops_retained_progress() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-1", "One", 1, true);
    remote.fail_on("fetch_changes", 1, GatewayError::Auth("expired".to_string()));
    let harness = Harness::new(remote).await;

    let err = harness
        .orchestrator
        .run_cycle(false, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, super::super::error::SyncError::Remote(GatewayError::Auth(_))));

    harness.completed().await;
    assert_eq!(harness.remote().calls("get_sync_summary"), 2);
}

#[tokio::test]
async fn mixed_edits_converge_on_both_sides() {
    use std::collections::{BTreeSet, HashMap};

    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    remote.put_notebook("nb-home", "Home", 2, false);
    remote.put_tag("tag-1", "Urgent", 3);
    remote.put_tag("tag-2", "Later", 4);
    remote.put_note(remote_note("n-1", "Plan", Some("nb-work"), 100, 5), Vec::new());
    remote.put_note(remote_note("n-2", "Groceries", Some("nb-home"), 100, 6), Vec::new());
    remote.put_note(remote_note("n-3", "Old", Some("nb-home"), 100, 7), Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;

    {
        let mut tx = harness.store().begin().await.unwrap();
        let travel = tx.create_local_notebook("Travel", None).await.unwrap();
        let trips = tx.create_local_tag("Trips").await.unwrap();
        tx.create_local_note("Itinerary", "<p>day one</p>", Some(travel), &[trips])
            .await
            .unwrap();
        let home = tx.notebook_by_guid("nb-home").await.unwrap().unwrap();
        tx.rename_local_notebook(home.id, "House", None).await.unwrap();
        let later = tx.tag_by_guid("tag-2").await.unwrap().unwrap();
        tx.delete_local_tag(later.id).await.unwrap();
        let groceries = tx.note_by_guid("n-2").await.unwrap().unwrap();
        tx.update_local_note(groceries.id, "Groceries v2", "", groceries.notebook_id)
            .await
            .unwrap();
        let old = tx.note_by_guid("n-3").await.unwrap().unwrap();
        tx.delete_local_note(old.id).await.unwrap();
        tx.commit().await.unwrap();
    }
    let next = harness.remote().update_count() + 1;
    harness
        .remote()
        .put_note(remote_note("n-1", "Plan v2", Some("nb-work"), 300, next), Vec::new());
    harness.remote().put_tag("tag-1", "Critical", next + 1);

    let mut converged = false;
    for _ in 0..4 {
        harness.completed().await;
        let state = harness.store().sync_state().await.unwrap();
        if state.local_usn == harness.remote().update_count() {
            converged = true;
            break;
        }
    }
    assert!(converged);

    let local_notebooks = harness.notebooks().await;
    let notebook_guids: HashMap<i64, String> = local_notebooks
        .iter()
        .map(|nb| (nb.id, nb.guid.clone().unwrap_or_default()))
        .collect();
    let local: BTreeSet<(String, String)> = local_notebooks
        .iter()
        .map(|nb| (nb.guid.clone().unwrap_or_default(), nb.name.clone()))
        .collect();
    let remote: BTreeSet<(String, String)> = harness
        .remote()
        .notebooks()
        .into_iter()
        .map(|nb| (nb.guid.unwrap_or_default(), nb.name))
        .collect();
    assert_eq!(local, remote);
    assert!(remote.iter().any(|(_, name)| name == "House"));

    let mut tx = harness.store().begin().await.unwrap();
    let local_tags = tx.list_tags().await.unwrap();
    drop(tx);
    let local: BTreeSet<(String, String)> = local_tags
        .into_iter()
        .map(|tag| (tag.guid.unwrap_or_default(), tag.name))
        .collect();
    let remote: BTreeSet<(String, String)> = harness
        .remote()
        .tags()
        .into_iter()
        .map(|tag| (tag.guid.unwrap_or_default(), tag.name))
        .collect();
    assert_eq!(local, remote);
    assert_eq!(remote.len(), 2);

    let local: BTreeSet<(String, String, String)> = harness
        .notes()
        .await
        .into_iter()
        .filter(|note| note.action != PendingAction::Conflict)
        .map(|note| {
            let notebook = note
                .notebook_id
                .and_then(|id| notebook_guids.get(&id).cloned())
                .unwrap_or_default();
            (note.guid.unwrap_or_default(), note.title, notebook)
        })
        .collect();
    let remote: BTreeSet<(String, String, String)> = harness
        .remote()
        .notes()
        .into_iter()
        .map(|note| {
            (
                note.guid.unwrap_or_default(),
                note.title,
                note.notebook_guid.unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(local, remote);
    let titles: BTreeSet<&str> = remote.iter().map(|(_, title, _)| title.as_str()).collect();
    assert_eq!(titles, BTreeSet::from(["Groceries v2", "Itinerary", "Plan v2"]));
}
