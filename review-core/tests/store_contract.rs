//! Behaviour every `ReviewStore` backend must share.
//!
//! Each check is written once against `&dyn ReviewStore` and run for both the
//! SQLite and the in-memory store.

use std::sync::Arc;

use review_core::models::ReviewStatus;
use review_core::{
    Advance, MemoryStore, ReviewError, ReviewMachine, ReviewState, ReviewStore, SqliteStore,
    StoreError,
};
use tokio_test::{assert_err, assert_ok};

fn paths(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

async fn backends() -> Vec<(&'static str, Arc<dyn ReviewStore>)> {
    let sqlite: Arc<dyn ReviewStore> = Arc::new(SqliteStore::in_memory());
    let memory: Arc<dyn ReviewStore> = Arc::new(MemoryStore::new());
    for store in [&sqlite, &memory] {
        store.initialize().await.unwrap();
    }
    vec![("sqlite", sqlite), ("memory", memory)]
}

#[tokio::test]
async fn operations_before_initialize_fail() {
    let stores: Vec<(&str, Arc<dyn ReviewStore>)> = vec![
        ("sqlite", Arc::new(SqliteStore::in_memory())),
        ("memory", Arc::new(MemoryStore::new())),
    ];

    for (name, store) in stores {
        let files = paths(&["a.rs"]);
        assert!(
            matches!(
                store.is_in_progress("1").await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
        assert!(
            matches!(
                store.start_review("1", &files).await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
        assert!(
            matches!(
                store.get_next_file("1").await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
        assert!(
            matches!(
                store.mark_reviewed("1", "a.rs").await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
        assert!(
            matches!(
                store.complete_review("1").await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
        assert!(
            matches!(
                store.reset_review("1").await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
    }
}

#[tokio::test]
async fn close_makes_the_store_unusable_until_reinitialized() {
    for (name, store) in backends().await {
        assert_ok!(store.close().await, "{name}");
        assert!(
            matches!(
                store.get_session("1").await,
                Err(StoreError::NotInitialized)
            ),
            "{name}"
        );
        assert_ok!(store.initialize().await, "{name}");
        assert_ok!(store.get_session("1").await, "{name}");
    }
}

#[tokio::test]
async fn reset_then_not_in_progress() {
    for (name, store) in backends().await {
        for pr in ["1", "2", "feature/x"] {
            store.start_review(pr, &paths(&["a.rs"])).await.unwrap();
            store.reset_review(pr).await.unwrap();
            assert!(!store.is_in_progress(pr).await.unwrap(), "{name} {pr}");
            assert!(store.get_session(pr).await.unwrap().is_none(), "{name}");
            assert!(store.list_files(pr).await.unwrap().is_empty(), "{name}");
        }
    }
}

#[tokio::test]
async fn reset_without_session_is_a_no_op() {
    for (name, store) in backends().await {
        assert_ok!(store.reset_review("never").await, "{name}");
        assert_ok!(store.reset_review("never").await, "{name}");
        assert!(!store.is_in_progress("never").await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn start_creates_an_ordered_unreviewed_file_list() {
    for (name, store) in backends().await {
        let files = paths(&["z.rs", "a.rs", "m.rs"]);
        store.start_review("5", &files).await.unwrap();

        assert!(store.is_in_progress("5").await.unwrap(), "{name}");
        let session = store.get_session("5").await.unwrap().unwrap();
        assert_eq!(session.status, ReviewStatus::InProgress, "{name}");
        assert_eq!(session.current_index, 0, "{name}");
        assert_eq!(session.total_files, 3, "{name}");

        let listed = store.list_files("5").await.unwrap();
        let order: Vec<(&str, u32, bool)> = listed
            .iter()
            .map(|f| (f.file_path.as_str(), f.review_order, f.reviewed))
            .collect();
        assert_eq!(
            order,
            vec![("z.rs", 0, false), ("a.rs", 1, false), ("m.rs", 2, false)],
            "{name}"
        );
    }
}

#[tokio::test]
async fn start_replaces_the_previous_file_list() {
    for (name, store) in backends().await {
        store
            .start_review("5", &paths(&["old1.rs", "old2.rs"]))
            .await
            .unwrap();
        store.mark_reviewed("5", "old1.rs").await.unwrap();

        store.start_review("5", &paths(&["new.rs"])).await.unwrap();

        let session = store.get_session("5").await.unwrap().unwrap();
        assert_eq!(session.current_index, 0, "{name}");
        assert_eq!(session.total_files, 1, "{name}");
        let listed: Vec<String> = store
            .list_files("5")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.file_path)
            .collect();
        assert_eq!(listed, vec!["new.rs".to_string()], "{name}");
    }
}

#[tokio::test]
async fn duplicate_paths_are_rejected_without_touching_existing_state() {
    for (name, store) in backends().await {
        store.start_review("5", &paths(&["a.rs"])).await.unwrap();

        let err = store
            .start_review("5", &paths(&["b.rs", "c.rs", "b.rs"]))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, StoreError::DuplicateFile { path, .. } if path == "b.rs"),
            "{name}: {err:?}"
        );

        let listed: Vec<String> = store
            .list_files("5")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.file_path)
            .collect();
        assert_eq!(listed, vec!["a.rs".to_string()], "{name}");
    }
}

#[tokio::test]
async fn next_file_and_mark_reviewed_walk_the_cursor() {
    for (name, store) in backends().await {
        store
            .start_review("8", &paths(&["a.rs", "b.rs"]))
            .await
            .unwrap();

        let next = store.get_next_file("8").await.unwrap().unwrap();
        assert_eq!(
            (next.file_path.as_str(), next.current, next.total),
            ("a.rs", 1, 2),
            "{name}"
        );
        // Reading does not advance.
        assert_eq!(store.get_next_file("8").await.unwrap(), Some(next), "{name}");

        store.mark_reviewed("8", "a.rs").await.unwrap();
        let next = store.get_next_file("8").await.unwrap().unwrap();
        assert_eq!(
            (next.file_path.as_str(), next.current, next.total),
            ("b.rs", 2, 2),
            "{name}"
        );

        store.mark_reviewed("8", "b.rs").await.unwrap();
        assert_eq!(store.get_next_file("8").await.unwrap(), None, "{name}");

        let session = store.get_session("8").await.unwrap().unwrap();
        assert_eq!(session.current_index, 2, "{name}");
        assert!(
            store.list_files("8").await.unwrap().iter().all(|f| f.reviewed),
            "{name}"
        );
    }
}

#[tokio::test]
async fn mark_reviewed_rejects_unknown_session_and_file() {
    for (name, store) in backends().await {
        assert!(
            matches!(
                store.mark_reviewed("nope", "a.rs").await,
                Err(StoreError::SessionNotFound(pr)) if pr == "nope"
            ),
            "{name}"
        );

        store.start_review("3", &paths(&["a.rs"])).await.unwrap();
        assert!(
            matches!(
                store.mark_reviewed("3", "b.rs").await,
                Err(StoreError::FileNotFound { .. })
            ),
            "{name}"
        );
        let session = store.get_session("3").await.unwrap().unwrap();
        assert_eq!(session.current_index, 0, "{name}");
    }
}

#[tokio::test]
async fn only_the_file_at_the_cursor_can_be_marked() {
    for (name, store) in backends().await {
        store
            .start_review("2", &paths(&["a.rs", "b.rs", "c.rs"]))
            .await
            .unwrap();

        assert!(
            matches!(
                store.mark_reviewed("2", "b.rs").await,
                Err(StoreError::NotAtCursor { path, .. }) if path == "b.rs"
            ),
            "{name}"
        );

        // Two readers saw `a.rs`; only the first mark counts.
        store.mark_reviewed("2", "a.rs").await.unwrap();
        assert!(
            matches!(
                store.mark_reviewed("2", "a.rs").await,
                Err(StoreError::NotAtCursor { .. })
            ),
            "{name}"
        );

        let session = store.get_session("2").await.unwrap().unwrap();
        assert_eq!(session.current_index, 1, "{name}");
        let flags: Vec<(String, bool)> = store
            .list_files("2")
            .await
            .unwrap()
            .into_iter()
            .map(|f| (f.file_path, f.reviewed))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("a.rs".to_string(), true),
                ("b.rs".to_string(), false),
                ("c.rs".to_string(), false),
            ],
            "{name}"
        );
        assert_eq!(
            store.get_next_file("2").await.unwrap().unwrap().file_path,
            "b.rs",
            "{name}"
        );

        store.complete_review("2").await.unwrap();
        assert!(
            matches!(
                store.mark_reviewed("2", "b.rs").await,
                Err(StoreError::NotAtCursor { .. })
            ),
            "{name}"
        );
    }
}

#[tokio::test]
async fn completed_sessions_hand_out_nothing() {
    for (name, store) in backends().await {
        store.start_review("4", &paths(&["a.rs"])).await.unwrap();
        store.complete_review("4").await.unwrap();
        store.complete_review("4").await.unwrap();

        assert!(!store.is_in_progress("4").await.unwrap(), "{name}");
        assert_eq!(store.get_next_file("4").await.unwrap(), None, "{name}");
        assert_eq!(
            store.get_session("4").await.unwrap().unwrap().status,
            ReviewStatus::Completed,
            "{name}"
        );
        assert_ok!(store.complete_review("absent").await, "{name}");
    }
}

#[tokio::test]
async fn sessions_are_isolated_per_pull_request() {
    for (name, store) in backends().await {
        store.start_review("1", &paths(&["a.rs"])).await.unwrap();
        store
            .start_review("2", &paths(&["a.rs", "b.rs"]))
            .await
            .unwrap();
        store.mark_reviewed("1", "a.rs").await.unwrap();

        assert_eq!(
            store.get_next_file("2").await.unwrap().unwrap().file_path,
            "a.rs",
            "{name}"
        );
        store.reset_review("1").await.unwrap();
        assert!(store.is_in_progress("2").await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn second_start_is_rejected_and_keeps_the_first_order() {
    for (name, store) in backends().await {
        let machine = ReviewMachine::new(store.clone());
        machine.start("6", &paths(&["a.rs", "b.rs"])).await.unwrap();

        let err = assert_err!(machine.start("6", &paths(&["x.rs"])).await, "{name}");
        assert!(matches!(err, ReviewError::AlreadyInProgress(pr) if pr == "6"));

        let listed: Vec<String> = store
            .list_files("6")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.file_path)
            .collect();
        assert_eq!(listed, paths(&["a.rs", "b.rs"]), "{name}");
    }
}

#[tokio::test]
async fn advancing_exhausts_files_in_review_order_once_each() {
    for (name, store) in backends().await {
        let files = paths(&["d.rs", "b.rs", "a.rs", "c.rs"]);
        let machine = ReviewMachine::new(store.clone());
        machine.start("10", &files).await.unwrap();

        let mut seen = Vec::new();
        while let Advance::Item(next) = machine.advance_file("10").await.unwrap() {
            assert_eq!(next.current as usize, seen.len() + 1, "{name}");
            assert_eq!(next.total, 4, "{name}");
            seen.push(next.file_path);
        }

        assert_eq!(seen, files, "{name}");
        assert_eq!(
            machine.state("10").await.unwrap(),
            ReviewState::Completed { total_files: 4 },
            "{name}"
        );
        assert_eq!(
            machine.advance_file("10").await.unwrap(),
            Advance::Complete,
            "{name}"
        );
    }
}

#[tokio::test]
async fn sqlite_progress_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("reviews.db");

    let store = Arc::new(SqliteStore::new(&db_path));
    store.initialize().await.unwrap();
    let machine = ReviewMachine::new(store.clone());
    machine
        .start("77", &paths(&["a.rs", "b.rs", "c.rs"]))
        .await
        .unwrap();
    machine.advance_file("77").await.unwrap();
    store.close().await.unwrap();

    let reopened = Arc::new(SqliteStore::new(&db_path));
    reopened.initialize().await.unwrap();
    let machine = ReviewMachine::new(reopened.clone());

    assert_eq!(
        machine.state("77").await.unwrap(),
        ReviewState::InProgress {
            current_index: 1,
            total_files: 3
        }
    );
    match machine.advance_file("77").await.unwrap() {
        Advance::Item(next) => assert_eq!((next.file_path.as_str(), next.current), ("b.rs", 2)),
        Advance::Complete => panic!("review ended early"),
    }
    reopened.close().await.unwrap();
}
