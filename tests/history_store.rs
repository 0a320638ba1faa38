// tests/history_store.rs
use std::sync::Arc;

use daily_poem_bot::content::ContentId;
use daily_poem_bot::history::{Claim, HistoryStore, PersistenceError};

#[tokio::test]
async fn appended_ids_are_contained_and_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let store = HistoryStore::open(&path).await.unwrap();
    for id in [5, 7, 11] {
        store.append(ContentId::Num(id)).await.unwrap();
        assert!(store.contains(&ContentId::Num(id)).await);
    }
    store.append(ContentId::Num(7)).await.unwrap(); // no-op
    drop(store);

    let reopened = HistoryStore::open(&path).await.unwrap();
    assert_eq!(
        reopened.snapshot().await,
        vec![ContentId::Num(5), ContentId::Num(7), ContentId::Num(11)]
    );
    assert!(!reopened.contains(&ContentId::Num(13)).await);
}

#[tokio::test]
async fn reads_plain_number_arrays_and_string_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, r#"[2131, 40522, "slug-id"]"#).unwrap();

    let store = HistoryStore::open(&path).await.unwrap();
    assert!(store.contains(&ContentId::Num(40522)).await);
    assert!(store.contains(&ContentId::from("slug-id")).await);

    store.append(ContentId::Num(1)).await.unwrap();
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk, r#"[2131,40522,"slug-id",1]"#);
}

#[tokio::test]
async fn corrupt_file_is_rejected_not_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    std::fs::write(&path, "[1, 2,").unwrap();

    let err = HistoryStore::open(&path).await.unwrap_err();
    assert!(matches!(err, PersistenceError::Corrupt { .. }));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1, 2,");
}

#[tokio::test]
async fn failed_write_still_remembers_the_id() {
    let dir = tempfile::tempdir().unwrap();
    // Parent directory does not exist, so every write fails.
    let store = HistoryStore::open(dir.path().join("missing").join("history.json"))
        .await
        .unwrap();

    let id = ContentId::Num(99);
    match store.claim(&id).await {
        Claim::Fresh { persisted } => {
            assert!(matches!(persisted, Err(PersistenceError::Write { .. })))
        }
        other => panic!("expected fresh claim, got {other:?}"),
    }
    assert!(store.contains(&id).await);
    assert!(matches!(store.claim(&id).await, Claim::Seen));
}

#[tokio::test]
async fn concurrent_claims_of_one_id_yield_a_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let store = Arc::new(HistoryStore::open(&path).await.unwrap());

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let s = store.clone();
        tasks.push(tokio::spawn(async move {
            matches!(s.claim(&ContentId::Num(7)).await, Claim::Fresh { .. })
        }));
    }
    let mut fresh = 0;
    for t in tasks {
        if t.await.unwrap() {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);

    let on_disk: Vec<i64> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, vec![7]);
}
