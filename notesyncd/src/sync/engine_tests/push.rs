use super::*;

#[tokio::test]
async fn local_creates_receive_remote_guids() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let note_id = {
        let mut tx = harness.store().begin().await.unwrap();
        let notebook = tx.notebook_by_guid("nb-work").await.unwrap().unwrap();
        let tag = tx.create_local_tag("urgent").await.unwrap();
        let id = tx
            .create_local_note("Plan", "<p>steps</p>", Some(notebook.id), &[tag])
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    };

    let summary = harness.completed().await;
    assert_eq!(summary.pushed.created, 2);

    let mut tx = harness.store().begin().await.unwrap();
    let note = tx.note_by_id(note_id).await.unwrap().unwrap();
    let tags = tx.list_tags().await.unwrap();
    drop(tx);
    let guid = note.guid.clone().unwrap();
    assert_eq!(note.action, PendingAction::None);
    assert!(note.usn.is_some());
    assert_eq!(tags[0].action, PendingAction::None);

    let pushed = harness.remote().note(&guid).unwrap();
    assert_eq!(pushed.title, "Plan");
    assert_eq!(pushed.notebook_guid.as_deref(), Some("nb-work"));
    assert_eq!(pushed.tag_guids, vec![tags[0].guid.clone().unwrap()]);
}

#[tokio::test]
async fn invalid_names_are_dropped_with_event() {
    let harness = Harness::new(FakeRemote::new()).await;
    let (notebook_id, tag_id) = {
        let mut tx = harness.store().begin().await.unwrap();
        let notebook = tx.create_local_notebook("   ", None).await.unwrap();
        let tag = tx.create_local_tag("a,b").await.unwrap();
        tx.commit().await.unwrap();
        (notebook, tag)
    };

    let summary = harness.completed().await;
    assert_eq!(summary.pushed.rejected, 2);
    assert_eq!(harness.remote().calls("create_notebook"), 0);
    assert_eq!(harness.remote().calls("create_tag"), 0);

    let mut tx = harness.store().begin().await.unwrap();
    let notebook = tx.notebook_by_id(notebook_id).await.unwrap().unwrap();
    let tag = tx.tag_by_id(tag_id).await.unwrap().unwrap();
    assert_eq!(notebook.action, PendingAction::None);
    assert_eq!(notebook.guid, None);
    assert_eq!(tag.action, PendingAction::None);

    let failures: Vec<(EntityKind, i64)> = harness
        .recorder
        .events()
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::ValidationFailed { kind, local_id, .. } => Some((kind, local_id)),
            _ => None,
        })
        .collect();
    assert_eq!(
        failures,
        vec![(EntityKind::Notebook, notebook_id), (EntityKind::Tag, tag_id)]
    );
}

#[tokio::test]
async fn duplicate_notebook_is_merged_into_remote_one() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let (dup_id, note_id) = {
        let mut tx = harness.store().begin().await.unwrap();
        let dup = tx.create_local_notebook("work", None).await.unwrap();
        let note = tx
            .create_local_note("Filed", "", Some(dup), &[])
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (dup, note)
    };

    let summary = harness.completed().await;
    assert_eq!(summary.pushed.duplicates, 1);
    assert_eq!(summary.pushed.merged, 1);

    let mut tx = harness.store().begin().await.unwrap();
    assert!(tx.notebook_by_id(dup_id).await.unwrap().is_none());
    let work = tx.notebook_by_guid("nb-work").await.unwrap().unwrap();
    let note = tx.note_by_id(note_id).await.unwrap().unwrap();
    drop(tx);
    assert_eq!(note.notebook_id, Some(work.id));
    assert_eq!(harness.remote().notebooks().len(), 1);

    let pushed = harness.remote().note(note.guid.as_deref().unwrap()).unwrap();
    assert_eq!(pushed.notebook_guid.as_deref(), Some("nb-work"));
}

#[tokio::test]
async fn duplicate_tag_links_move_to_remote_tag() {
    let remote = FakeRemote::new();
    remote.put_tag("tag-1", "Urgent", 1);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let note_id = {
        let mut tx = harness.store().begin().await.unwrap();
        let dup = tx.create_local_tag("urgent").await.unwrap();
        let note = tx.create_local_note("Call", "", None, &[dup]).await.unwrap();
        tx.commit().await.unwrap();
        note
    };

    harness.completed().await;

    let mut tx = harness.store().begin().await.unwrap();
    let tags = tx.list_tags().await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].guid.as_deref(), Some("tag-1"));
    assert_eq!(tx.note_tag_ids(note_id).await.unwrap(), vec![tags[0].id]);
}

#[tokio::test]
async fn delete_is_idempotent_when_remote_already_gone() {
    let remote = FakeRemote::new();
    remote.put_note(remote_note("n-1", "Old", None, 100, 1), Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;

    {
        let mut tx = harness.store().begin().await.unwrap();
        let note = tx.note_by_guid("n-1").await.unwrap().unwrap();
        assert!(tx.delete_local_note(note.id).await.unwrap().is_empty());
        tx.commit().await.unwrap();
    }
    harness
        .remote()
        .fail_on("delete_note", 1, GatewayError::NotFound("n-1".to_string()));

    let summary = harness.completed().await;
    assert_eq!(summary.pushed.deleted, 1);
    assert!(harness.note_by_guid("n-1").await.is_none());
}

#[tokio::test]
async fn local_delete_removes_remote_note_and_blobs() {
    let remote = FakeRemote::new();
    remote.put_note(
        remote_note("n-1", "Scan", None, 100, 1),
        vec![(remote_resource("res-1", "scan.txt", b"body"), b"body".to_vec())],
    );
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let note = harness.note_by_guid("n-1").await.unwrap();
    let mut tx = harness.store().begin().await.unwrap();
    let path = tx.resources_for_note(note.id).await.unwrap()[0].file_path.clone();
    tx.delete_local_note(note.id).await.unwrap();
    tx.commit().await.unwrap();
    assert!(std::path::Path::new(&path).exists());

    harness.completed().await;
    assert!(harness.remote().note("n-1").is_none());
    assert!(harness.note_by_guid("n-1").await.is_none());
    assert!(!std::path::Path::new(&path).exists());
}

#[tokio::test]
async fn changed_note_missing_remotely_is_created_again() {
    let remote = FakeRemote::new();
    remote.put_note(remote_note("n-1", "Draft", None, 100, 1), Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;

    {
        let mut tx = harness.store().begin().await.unwrap();
        let note = tx.note_by_guid("n-1").await.unwrap().unwrap();
        tx.update_local_note(note.id, "Draft v2", "", None)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
    harness
        .remote()
        .fail_on("update_note", 1, GatewayError::NotFound("n-1".to_string()));

    harness.completed().await;
    let notes = harness.notes().await;
    assert_eq!(notes.len(), 1);
    let guid = notes[0].guid.clone().unwrap();
    assert_ne!(guid, "n-1");
    assert_eq!(harness.remote().note(&guid).unwrap().title, "Draft v2");
}

#[tokio::test]
async fn share_requests_are_pushed() {
    let remote = FakeRemote::new();
    remote.put_note(remote_note("n-1", "Recipe", None, 100, 1), Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;
    let note_id = harness.note_by_guid("n-1").await.unwrap().id;

    let mut tx = harness.store().begin().await.unwrap();
    tx.request_share(note_id).await.unwrap();
    tx.commit().await.unwrap();
    harness.completed().await;

    let note = harness.note_by_guid("n-1").await.unwrap();
    assert_eq!(note.share_status, ShareStatus::Shared);
    assert!(note.share_url.is_some());
    assert_eq!(note.action, PendingAction::None);
    assert_eq!(harness.remote().calls("update_note"), 0);
    assert!(harness.remote().note("n-1").unwrap().attributes.share_date.is_some());

    let mut tx = harness.store().begin().await.unwrap();
    tx.request_stop_sharing(note_id).await.unwrap();
    tx.commit().await.unwrap();
    harness.completed().await;

    let note = harness.note_by_guid("n-1").await.unwrap();
    assert_eq!(note.share_status, ShareStatus::None);
    assert_eq!(note.share_url, None);
    assert_eq!(harness.remote().calls("stop_sharing_note"), 1);
    assert!(harness.remote().note("n-1").unwrap().attributes.share_date.is_none());
}

#[tokio::test]
async fn rate_limited_share_keeps_created_note() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let note_id = {
        let mut tx = harness.store().begin().await.unwrap();
        let id = tx.create_local_note("Plan", "", None, &[]).await.unwrap();
        tx.request_share(id).await.unwrap();
        tx.commit().await.unwrap();
        id
    };
    harness.remote().fail_on("share_note", 1, rate_limited(60));

    assert!(matches!(
        harness.cycle().await,
        CycleOutcome::RateLimited { .. }
    ));
    let mut tx = harness.store().begin().await.unwrap();
    let note = tx.note_by_id(note_id).await.unwrap().unwrap();
    drop(tx);
    assert!(note.guid.is_some());
    assert_eq!(note.action, PendingAction::None);
    assert_eq!(note.share_status, ShareStatus::NeedShare);
    assert_eq!(harness.remote().notes().len(), 1);

    clear_rate_limit(&harness).await;
    harness.completed().await;

    let note = harness.note_by_guid(note.guid.as_deref().unwrap()).await.unwrap();
    assert_eq!(note.id, note_id);
    assert_eq!(note.share_status, ShareStatus::Shared);
    assert_eq!(harness.remote().calls("create_note"), 1);
    let titles: Vec<String> = harness.remote().notes().into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["Plan".to_string()]);
}
