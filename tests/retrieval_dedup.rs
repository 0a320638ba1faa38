// tests/retrieval_dedup.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::Weekday;
use daily_poem_bot::content::mock::{sample_item, ScriptedSource};
use daily_poem_bot::content::{ContentId, FetchError};
use daily_poem_bot::history::HistoryStore;
use daily_poem_bot::schedule::{CategoryId, CategorySchedule};
use daily_poem_bot::{UniqueRetriever, RETRY_BUDGET};

async fn setup(source: Arc<ScriptedSource>) -> (UniqueRetriever, Arc<HistoryStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(
        HistoryStore::open(dir.path().join("history.json"))
            .await
            .unwrap(),
    );
    let retriever = UniqueRetriever::new(
        source,
        history.clone(),
        Arc::new(CategorySchedule::default()),
    );
    (retriever, history, dir)
}

#[tokio::test]
async fn duplicates_are_skipped_until_a_new_id() {
    let source = Arc::new(ScriptedSource::with_ids(&[5, 5, 7]));
    let (r, history, _dir) = setup(source.clone()).await;

    // first call accepts 5 straight away
    let first = r.fetch_unique(Weekday::Sat).await.unwrap();
    assert_eq!(first.item.id, ContentId::Num(5));
    assert_eq!(first.attempts, 1);

    // second call sees 5 again, then 7
    let second = r.fetch_unique(Weekday::Sat).await.unwrap();
    assert_eq!(second.item.id, ContentId::Num(7));
    assert_eq!(second.attempts, 2);
    assert_eq!(source.call_count(), 3);

    assert_eq!(
        history.snapshot().await,
        vec![ContentId::Num(5), ContentId::Num(7)]
    );
}

#[tokio::test]
async fn five_five_seven_from_empty_history_with_five_preseeded() {
    let source = Arc::new(ScriptedSource::with_ids(&[5, 5, 7]));
    let (r, history, _dir) = setup(source.clone()).await;
    history.append(ContentId::Num(5)).await.unwrap();

    let got = r.fetch_unique(Weekday::Sun).await.unwrap();
    assert_eq!(got.item.id, ContentId::Num(7));
    assert_eq!(got.attempts, 3);
    assert_eq!(source.call_count(), 3);
    assert!(history.contains(&ContentId::Num(5)).await);
    assert!(history.contains(&ContentId::Num(7)).await);
    assert_eq!(history.len().await, 2);
}

#[tokio::test]
async fn always_seen_source_gives_up_after_exactly_the_budget() {
    let source = Arc::new(ScriptedSource::repeating(42));
    let (r, history, _dir) = setup(source.clone()).await;
    history.append(ContentId::Num(42)).await.unwrap();

    assert!(r.fetch_unique(Weekday::Mon).await.is_none());
    assert_eq!(source.call_count(), RETRY_BUDGET as usize);
    assert_eq!(RETRY_BUDGET, 5);
}

#[tokio::test]
async fn fetch_errors_use_up_attempts_without_aborting() {
    let source = Arc::new(ScriptedSource::new(vec![
        Err(FetchError::Network("connection reset".into())),
        Err(FetchError::Status(502)),
        Err(FetchError::MissingField("title")),
        Ok(sample_item(9)),
    ]));
    let (r, _history, _dir) = setup(source.clone()).await;

    let got = r.fetch_unique(Weekday::Wed).await.unwrap();
    assert_eq!(got.item.id, ContentId::Num(9));
    assert_eq!(got.attempts, 4);
}

#[tokio::test]
async fn never_returns_an_id_already_in_history() {
    let source = Arc::new(ScriptedSource::with_ids(&[1, 2, 3, 4, 5]));
    let (r, history, _dir) = setup(source).await;
    for id in [1, 2, 3, 4] {
        history.append(ContentId::Num(id)).await.unwrap();
    }

    let got = r.fetch_unique(Weekday::Thu).await.unwrap();
    assert_eq!(got.item.id, ContentId::Num(5));
    assert_eq!(got.attempts, RETRY_BUDGET);
}

#[tokio::test]
async fn uses_the_category_for_the_given_weekday() {
    let source = Arc::new(ScriptedSource::with_ids(&[1]));
    let (r, _history, _dir) = setup(source.clone()).await;

    let got = r.fetch_unique(Weekday::Thu).await.unwrap();
    assert_eq!(got.category.id, CategoryId(71));
    assert_eq!(*source.calls.lock().unwrap(), vec![CategoryId(71)]);
}

#[tokio::test(start_paused = true)]
async fn slow_fetches_time_out_and_count_as_attempts() {
    let source = Arc::new(ScriptedSource::repeating(1).with_delay(Duration::from_secs(60)));
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(HistoryStore::open(dir.path().join("h.json")).await.unwrap());
    let r = UniqueRetriever::new(
        source.clone(),
        history.clone(),
        Arc::new(CategorySchedule::default()),
    )
    .with_attempt_timeout(Duration::from_secs(2));

    assert!(r.fetch_unique(Weekday::Fri).await.is_none());
    assert_eq!(source.call_count(), RETRY_BUDGET as usize);
    assert!(history.is_empty().await);
}

#[tokio::test]
async fn persistence_failure_still_hands_out_the_poem() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(
        HistoryStore::open(dir.path().join("no-such-dir").join("history.json"))
            .await
            .unwrap(),
    );
    let r = UniqueRetriever::new(
        Arc::new(ScriptedSource::with_ids(&[8])),
        history.clone(),
        Arc::new(CategorySchedule::default()),
    );

    let got = r.fetch_unique(Weekday::Sat).await.unwrap();
    assert_eq!(got.item.id, ContentId::Num(8));
    assert!(got.persist_error.is_some());
    assert!(history.contains(&ContentId::Num(8)).await);
}
