//! Ordering and exactly-once application across concurrent writers and
//! restarted subscribers.

use std::sync::Arc;

use futures_util::StreamExt;
use warfront_protocol::{BackoffPolicy, EventKind, GameId, IdentityId, StateEvent};
use warfront_sync::{Delivery, EventCursor, EventLog, ResumingSubscriber, SyncConfig};

fn left(id: u64) -> EventKind {
    EventKind::ParticipantLeft {
        identity_id: IdentityId(id),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_are_gap_free() {
    let log = EventLog::in_memory(GameId(1), 1024);
    let reader = log.subscribe(0).await;

    let writers: Vec<_> = (0..8)
        .map(|w| {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let mut seqs = Vec::new();
                for i in 0..25 {
                    seqs.push(log.append(left(w * 100 + i)).await.unwrap().sequence);
                }
                seqs
            })
        })
        .collect();

    let mut assigned = Vec::new();
    for writer in writers {
        let seqs = writer.await.unwrap();
        // Each writer sees its own appends in increasing order.
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        assigned.extend(seqs);
    }
    assigned.sort_unstable();
    assert_eq!(assigned, (1..=200).collect::<Vec<_>>());

    log.close().await;
    let delivered: Vec<u64> = reader.into_stream().map(|e| e.sequence).collect().await;
    assert_eq!(delivered, (1..=200).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_subscribe_from_17_yields_18_onward_in_order() {
    let log = EventLog::in_memory(GameId(1), 64);
    for i in 1..=20 {
        log.append(left(i)).await.unwrap();
    }

    let mut sub = log.subscribe(17).await;
    log.append(left(21)).await.unwrap();
    log.close().await;

    let mut seen = Vec::new();
    while let Some(event) = sub.next().await {
        seen.push(event.sequence);
    }
    assert_eq!(seen, vec![18, 19, 20, 21]);
}

#[tokio::test]
async fn test_redelivered_events_apply_exactly_once() {
    let log = EventLog::in_memory(GameId(1), 64);
    for i in 1..=25 {
        log.append(left(i)).await.unwrap();
    }
    log.close().await;

    // A client applies 18..=22, drops, and resubscribes from an older
    // position than it reached. The overlap must be ignored.
    let mut cursor = EventCursor::new(17);
    let mut applied: Vec<StateEvent> = Vec::new();

    let mut first = log.subscribe(17).await;
    for _ in 0..5 {
        let event = first.next().await.unwrap();
        assert_eq!(cursor.offer(&event), Delivery::Apply);
        applied.push(event);
    }
    drop(first);

    let mut second = log.subscribe(15).await;
    while let Some(event) = second.next().await {
        if cursor.offer(&event) == Delivery::Apply {
            applied.push(event);
        }
    }

    let seqs: Vec<u64> = applied.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, (18..=25).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_resuming_subscriber_over_log_ends_with_game() {
    let log = EventLog::in_memory(GameId(3), 64);
    for i in 1..=3 {
        log.append(left(i)).await.unwrap();
    }
    let mut sub = ResumingSubscriber::new(Arc::clone(&log), GameId(3), 1, BackoffPolicy::default());

    assert_eq!(sub.next().await.unwrap().unwrap().sequence, 2);
    log.append(EventKind::GameCompleted { winner: None }).await.unwrap();
    assert_eq!(sub.next().await.unwrap().unwrap().sequence, 3);
    assert_eq!(sub.next().await.unwrap().unwrap().sequence, 4);
    assert!(sub.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restored_log_serves_old_and_new_subscribers() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig {
        journal_dir: Some(dir.path().join("journals")),
        ..SyncConfig::default()
    };

    {
        let log = EventLog::create(GameId(2), &config).await.unwrap();
        for i in 1..=4 {
            log.append(left(i)).await.unwrap();
        }
    }

    let log = EventLog::restore(GameId(2), &config).await.unwrap();
    let mut sub = log.subscribe(2).await;
    log.append(left(5)).await.unwrap();

    for expected in 3..=5 {
        assert_eq!(sub.next().await.unwrap().sequence, expected);
    }
}
