// tests/dispatch_isolation.rs
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use daily_poem_bot::activity::{ActivityLog, EventKind};
use daily_poem_bot::content::mock::sample_item;
use daily_poem_bot::dispatch::tally;
use daily_poem_bot::schedule::Category;
use daily_poem_bot::transport::{RecordingTransport, SentCall};
use daily_poem_bot::{Dispatcher, OutcomeKind, Recipient};

const A: Recipient = Recipient(101);
const B: Recipient = Recipient(202);
const C: Recipient = Recipient(303);

fn hafez() -> Category {
    Category::new(2, "حافظ")
}

fn setup(
    transport: RecordingTransport,
) -> (Dispatcher, Arc<RecordingTransport>, Arc<ActivityLog>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(transport);
    let activity = Arc::new(ActivityLog::open(dir.path().join("activity.log")));
    let dispatcher = Dispatcher::new(transport.clone(), activity.clone(), Some(A));
    (dispatcher, transport, activity, dir)
}

#[tokio::test]
async fn one_failing_chat_does_not_stop_the_others() {
    let (d, transport, activity, _dir) = setup(RecordingTransport::failing_for([B]));
    let item = sample_item(12);

    let outcomes = d.deliver(&item, &hafez(), &BTreeSet::from([A, B, C])).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[&A].kind, OutcomeKind::Sent);
    assert_eq!(outcomes[&B].kind, OutcomeKind::Failed);
    assert_eq!(outcomes[&C].kind, OutcomeKind::Sent);
    assert!(outcomes[&A].reason.is_none());
    assert!(outcomes[&B].reason.as_deref().unwrap().contains("blocked"));
    assert_eq!(tally(&outcomes), (2, 1));

    // every chat was attempted
    let texts: Vec<Recipient> = transport
        .deliveries()
        .iter()
        .filter(|c| matches!(c, SentCall::Text { .. }))
        .map(|c| c.recipient())
        .collect();
    assert_eq!(texts.len(), 3);
    for r in [A, B, C] {
        assert!(texts.contains(&r));
    }

    let sent = activity.entries_of(EventKind::PoemSent).await;
    let errors = activity.entries_of(EventKind::Error).await;
    assert_eq!(sent.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].subject, "202");
    assert!(errors[0].details.starts_with("Failed to send text:"));
    assert_eq!(sent[0].details, "Poet: Test Poet | Title: Poem 12");
}

#[tokio::test]
async fn header_names_the_scheduled_poet_not_the_api_author() {
    let (d, transport, activity, _dir) = setup(RecordingTransport::new());
    let mut item = sample_item(6);
    item.author_name = "خواجه شمس‌الدین محمد حافظ شیرازی".into();
    item.audio_url = Some("https://i.ganjoor.net/a/6.mp3".into());

    d.deliver(&item, &hafez(), &BTreeSet::from([A])).await;

    let texts = transport.texts_to(A);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].starts_with("🌞 *شعر امروز (حافظ)*"));
    assert!(!texts[0].contains("شمس‌الدین"));

    let audio_performer = transport.deliveries().into_iter().find_map(|c| match c {
        SentCall::Audio { meta, .. } => Some(meta.performer),
        _ => None,
    });
    assert_eq!(audio_performer.as_deref(), Some("خواجه شمس‌الدین محمد حافظ شیرازی"));
    let sent = activity.entries_of(EventKind::PoemSent).await;
    assert_eq!(sent[0].details, "Poet: خواجه شمس‌الدین محمد حافظ شیرازی | Title: Poem 6");
}

#[tokio::test]
async fn audio_follows_text_only_when_there_is_a_recording() {
    let (d, transport, activity, _dir) = setup(RecordingTransport::new());
    let mut item = sample_item(1);

    d.deliver(&item, &hafez(), &BTreeSet::from([A])).await;
    assert!(!transport
        .deliveries()
        .iter()
        .any(|c| matches!(c, SentCall::Audio { .. })));

    item.audio_url = Some("https://i.ganjoor.net/a/1.mp3".into());
    d.deliver(&item, &hafez(), &BTreeSet::from([A])).await;
    let audio: Vec<SentCall> = transport
        .deliveries()
        .into_iter()
        .filter(|c| matches!(c, SentCall::Audio { .. }))
        .collect();
    assert_eq!(audio.len(), 1);
    match &audio[0] {
        SentCall::Audio { url, meta, .. } => {
            assert_eq!(url, "https://i.ganjoor.net/a/1.mp3");
            assert_eq!(meta.performer, "Test Poet");
            assert_eq!(meta.caption, "🎙 دکلمه: Poem 1");
        }
        other => panic!("unexpected call {other:?}"),
    }
    assert_eq!(activity.entries_of(EventKind::AudioSent).await.len(), 1);
}

#[tokio::test]
async fn audio_failure_keeps_the_outcome_sent() {
    let (d, _transport, activity, _dir) = setup(RecordingTransport::new().with_audio_failure());
    let mut item = sample_item(4);
    item.audio_url = Some("https://i.ganjoor.net/a/4.mp3".into());

    let outcomes = d.deliver(&item, &hafez(), &BTreeSet::from([A, C])).await;
    assert!(outcomes.values().all(|o| o.is_sent()));
    assert_eq!(activity.entries_of(EventKind::AudioFail).await.len(), 2);
    assert_eq!(activity.entries_of(EventKind::PoemSent).await.len(), 2);
    assert!(activity.entries_of(EventKind::Error).await.is_empty());
}

#[tokio::test]
async fn typing_notice_precedes_each_text() {
    let (d, transport, _activity, _dir) = setup(RecordingTransport::new());
    d.deliver(&sample_item(2), &hafez(), &BTreeSet::from([A])).await;

    let calls = transport.calls();
    assert!(matches!(&calls[0], SentCall::Typing { to, .. } if *to == A));
    assert!(matches!(&calls[1], SentCall::Text { to, .. } if *to == A));
}

#[tokio::test]
async fn empty_recipient_set_sends_nothing() {
    let (d, transport, activity, _dir) = setup(RecordingTransport::new());
    let outcomes = d.deliver(&sample_item(2), &hafez(), &BTreeSet::new()).await;
    assert!(outcomes.is_empty());
    assert!(transport.calls().is_empty());
    assert!(activity.entries().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_send_is_recorded_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::new().with_delay(Duration::from_secs(120)));
    let activity = Arc::new(ActivityLog::open(dir.path().join("activity.log")));
    let d = Dispatcher::new(transport, activity.clone(), None).with_timeout(Duration::from_secs(5));

    let outcomes = d.deliver(&sample_item(3), &hafez(), &BTreeSet::from([A, B])).await;
    assert_eq!(tally(&outcomes), (0, 2));
    assert!(outcomes[&A].reason.as_deref().unwrap().contains("timed out"));
    assert_eq!(activity.entries_of(EventKind::Error).await.len(), 2);
}
