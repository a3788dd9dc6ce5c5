use super::*;

#[tokio::test]
async fn first_sync_mirrors_remote_account() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 5, false);
    remote.put_notebook("nb-personal", "Personal", 7, true);
    remote.put_note(remote_note("n-1", "Groceries", Some("nb-personal"), FAKE_NOW, 9), Vec::new());
    let harness = Harness::new(remote).await;

    let summary = harness.completed().await;
    assert!(summary.full);
    assert_eq!(summary.local_usn, 9);
    assert_eq!(summary.pulled.created, 3);

    let notebooks = harness.notebooks().await;
    assert_eq!(notebooks.len(), 2);
    let personal = notebooks
        .iter()
        .find(|nb| nb.guid.as_deref() == Some("nb-personal"))
        .unwrap();
    assert!(personal.is_default);
    assert_eq!(notebooks.iter().filter(|nb| nb.is_default).count(), 1);

    let note = harness.note_by_guid("n-1").await.unwrap();
    assert_eq!(note.title, "Groceries");
    assert_eq!(note.content, "<p>Groceries</p>");
    assert_eq!(note.notebook_id, Some(personal.id));
    assert_eq!(note.action, PendingAction::None);

    let state = harness.store().sync_state().await.unwrap();
    assert_eq!(state.local_usn, 9);
    assert_eq!(state.remote_usn, 9);
    assert!(state.last_sync.is_some());
    assert_eq!(harness.orchestrator.status().local_usn, 9);
}

#[tokio::test]
async fn second_sync_only_fetches_new_changes() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;
    let fetches = harness.remote().calls("fetch_changes");

    let summary = harness.completed().await;
    assert!(!summary.full);
    assert_eq!(harness.remote().calls("fetch_changes"), fetches);

    harness.remote().put_tag("tag-1", "urgent", 2);
    let summary = harness.completed().await;
    assert_eq!(summary.pulled.created, 1);
    let mut tx = harness.store().begin().await.unwrap();
    let tags = tx.list_tags().await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].guid.as_deref(), Some("tag-1"));
}

#[tokio::test]
async fn remote_edit_of_locally_changed_note_creates_conflict_copy() {
    let harness = Harness::new(FakeRemote::new()).await;
    let local_id = {
        let mut tx = harness.store().begin().await.unwrap();
        let id = tx
            .insert_note(&local_note(Some("n-1"), "Local title", 100, PendingAction::Change))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        id
    };
    harness
        .remote()
        .put_note(remote_note("n-1", "Remote title", None, 200, 3), Vec::new());

    let summary = harness.completed().await;
    assert_eq!(summary.pulled.conflicts, 1);

    let notes = harness.notes().await;
    assert_eq!(notes.len(), 2);
    let original = notes.iter().find(|note| note.id == local_id).unwrap();
    assert_eq!(original.title, "Local title");
    assert_eq!(original.action, PendingAction::None);
    let copy = notes.iter().find(|note| note.id != local_id).unwrap();
    assert_eq!(copy.title, "Remote title");
    assert_eq!(copy.updated, 200);
    assert_eq!(copy.guid, None);
    assert_eq!(copy.action, PendingAction::Conflict);
    assert_eq!(copy.conflict_parent_id, Some(local_id));

    assert!(harness.recorder.events().contains(&SyncEvent::ConflictCreated {
        original: local_id,
        copy: copy.id,
    }));
    // The local version wins on the server.
    assert_eq!(harness.remote().note("n-1").unwrap().title, "Local title");

    harness.completed().await;
    assert_eq!(harness.notes().await.len(), 2);
}

#[tokio::test]
async fn remote_edit_of_unchanged_note_overwrites_local_row() {
    let remote = FakeRemote::new();
    remote.put_note(remote_note("n-1", "Draft", None, 100, 1), Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;

    harness
        .remote()
        .put_note(remote_note("n-1", "Final", None, 200, 2), Vec::new());
    let summary = harness.completed().await;
    assert_eq!(summary.pulled.updated, 1);
    assert_eq!(summary.pulled.conflicts, 0);

    let note = harness.note_by_guid("n-1").await.unwrap();
    assert_eq!(note.title, "Final");
    assert_eq!(note.updated, 200);
}

#[tokio::test]
async fn full_sync_prunes_unseen_rows_but_incremental_does_not() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    {
        let mut tx = harness.store().begin().await.unwrap();
        tx.insert_notebook(&super::super::model::NotebookInput {
            guid: Some("nb-ghost".to_string()),
            name: "Ghost".to_string(),
            stack: None,
            usn: Some(1),
            service_created: None,
            service_updated: None,
            action: PendingAction::None,
        })
        .await
        .unwrap();
        tx.create_local_notebook("Unpushed", None).await.unwrap();
        tx.commit().await.unwrap();
    }

    harness.remote().put_tag("tag-1", "urgent", 2);
    harness.completed().await;
    let names: Vec<String> = harness.notebooks().await.into_iter().map(|nb| nb.name).collect();
    assert!(names.contains(&"Ghost".to_string()));

    let outcome = harness.force().await;
    let CycleOutcome::Completed(summary) = outcome else {
        panic!("forced cycle did not complete: {outcome:?}");
    };
    assert!(summary.full);
    let names: Vec<String> = harness.notebooks().await.into_iter().map(|nb| nb.name).collect();
    assert!(!names.contains(&"Ghost".to_string()));
    assert!(names.contains(&"Unpushed".to_string()));
    assert!(names.contains(&"Work".to_string()));
}

#[tokio::test]
async fn expunged_entities_are_removed_or_detached() {
    let remote = FakeRemote::new();
    remote.put_notebook("nb-work", "Work", 1, true);
    remote.put_notebook("nb-old", "Old", 2, false);
    remote.put_tag("tag-1", "urgent", 3);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    {
        let mut tx = harness.store().begin().await.unwrap();
        let old = tx.notebook_by_guid("nb-old").await.unwrap().unwrap();
        tx.rename_local_notebook(old.id, "Old but edited", None)
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }
    harness.remote().expunge(EntityKind::Tag, "tag-1");
    harness.remote().expunge(EntityKind::Notebook, "nb-old");

    let summary = harness.completed().await;
    assert!(summary.pulled.removed >= 1);

    let mut tx = harness.store().begin().await.unwrap();
    assert!(tx.list_tags().await.unwrap().is_empty());
    let notebooks = tx.list_notebooks().await.unwrap();
    drop(tx);
    let edited = notebooks
        .iter()
        .find(|nb| nb.name == "Old but edited")
        .unwrap();
    // Detached on expunge, then created again by the push phase.
    let new_guid = edited.guid.clone().unwrap();
    assert_ne!(new_guid, "nb-old");
    assert_eq!(edited.action, PendingAction::None);
    assert_eq!(harness.remote().notebook(&new_guid).unwrap().name, "Old but edited");
}

#[tokio::test]
async fn trashed_remote_note_is_removed_locally() {
    let remote = FakeRemote::new();
    remote.put_note(remote_note("n-1", "Temp", None, 100, 1), Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;
    assert!(harness.note_by_guid("n-1").await.is_some());

    let mut trashed = remote_note("n-1", "Temp", None, 150, 2);
    trashed.deleted = Some(FAKE_NOW);
    harness.remote().put_note(trashed, Vec::new());
    harness.completed().await;

    assert!(harness.note_by_guid("n-1").await.is_none());
}

#[tokio::test]
async fn resource_bodies_are_stored_under_note_directory() {
    let remote = FakeRemote::new();
    let resource = remote_resource("res-1", "scan.txt", b"hello");
    let hash = resource.body_hash.clone();
    remote.put_note(
        remote_note("n-1", "With file", None, 100, 1),
        vec![(resource, b"hello".to_vec())],
    );
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let note = harness.note_by_guid("n-1").await.unwrap();
    let mut tx = harness.store().begin().await.unwrap();
    let resources = tx.resources_for_note(note.id).await.unwrap();
    drop(tx);
    assert_eq!(resources.len(), 1);
    let expected = harness
        .blob_dir
        .path()
        .join(note.id.to_string())
        .join(&hash)
        .join("scan.txt");
    assert_eq!(resources[0].file_path, expected.to_string_lossy());
    assert_eq!(std::fs::read(&expected).unwrap(), b"hello");

    harness.remote().expunge(EntityKind::Note, "n-1");
    harness.completed().await;
    assert!(!expected.exists());
}

#[tokio::test]
async fn resource_with_wrong_hash_is_skipped() {
    let remote = FakeRemote::new();
    let mut resource = remote_resource("res-1", "scan.txt", b"hello");
    resource.body_hash = super::super::blobs::md5_hex(b"something else");
    remote.put_note(
        remote_note("n-1", "With file", None, 100, 1),
        vec![(resource, b"hello".to_vec())],
    );
    let harness = Harness::new(remote).await;
    let summary = harness.completed().await;
    assert_eq!(summary.pulled.created, 1);

    let note = harness.note_by_guid("n-1").await.unwrap();
    let mut tx = harness.store().begin().await.unwrap();
    assert!(tx.resources_for_note(note.id).await.unwrap().is_empty());
    drop(tx);
    assert!(!harness.blob_dir.path().join(note.id.to_string()).exists());
}

#[tokio::test]
async fn remotely_shared_note_gets_public_link() {
    let remote = FakeRemote::new();
    let mut note = remote_note("n-1", "Public", None, 100, 1);
    note.attributes.share_date = Some(FAKE_NOW);
    remote.put_note(note, Vec::new());
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let note = harness.note_by_guid("n-1").await.unwrap();
    assert_eq!(note.share_status, ShareStatus::Shared);
    assert_eq!(note.share_date, Some(FAKE_NOW));
    assert!(note.share_url.unwrap().ends_with("/sh/n-1/key-n-1"));
    assert_eq!(note.action, PendingAction::None);
}

#[tokio::test]
async fn saved_searches_and_linked_notebooks_are_mirrored() {
    let remote = FakeRemote::new();
    remote.put_search("s-1", "Todo", "tag:todo", 1);
    remote.put_linked("ln-1", "Team notes", 2);
    let harness = Harness::new(remote).await;
    harness.completed().await;

    let mut tx = harness.store().begin().await.unwrap();
    let searches = tx.list_saved_searches().await.unwrap();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].query, "tag:todo");
    let linked = tx.list_linked_notebooks().await.unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].share_name, "Team notes");
    drop(tx);

    harness.remote().expunge(EntityKind::SavedSearch, "s-1");
    harness.completed().await;
    let mut tx = harness.store().begin().await.unwrap();
    assert!(tx.list_saved_searches().await.unwrap().is_empty());
}
