//! Poll reconciler scenarios against recording fakes.

mod common;

use alert_sync::backend::Enrichment;
use alert_sync::{Counter, Status};
use common::Harness;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_no_tracked_posts_skips_backend() {
    let h = Harness::new();

    let report = h.poller().run_cycle().await.unwrap();

    assert_eq!(report.tracked, 0);
    assert_eq!(h.backend.list_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_assignee_drift_converges() {
    let h = Harness::new();
    h.seed_post("fp-1", "post-1", "jane").await;
    h.backend.put_assigned("fp-1", Some("bsmith"));
    let poller = h.poller();

    let first = poller.run_cycle().await.unwrap();
    assert_eq!(first.repaired, 1);
    assert_eq!(h.chat.update_count(), 1);
    let (message_id, attachment) = h.chat.last_update().unwrap();
    assert_eq!(message_id, "post-1");
    assert_eq!(attachment.field("Acknowledged by"), Some("@bob"));
    assert_eq!(h.chat.reply_texts(), vec!["Assigned to @bob via Keep UI".to_string()]);
    assert_eq!(h.tracked("fp-1").await.unwrap().last_known_assignee, "bob");

    let second = poller.run_cycle().await.unwrap();
    assert_eq!(second.repaired, 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(h.chat.update_count(), 1);
    assert_eq!(h.chat.reply_texts().len(), 1);
}

#[tokio::test]
async fn test_unmapped_backend_assignee_shown_raw() {
    let h = Harness::new();
    h.seed_post("fp-1", "post-1", "").await;
    h.backend.put_assigned("fp-1", Some("contractor@example.com"));

    h.poller().run_cycle().await.unwrap();

    assert_eq!(
        h.tracked("fp-1").await.unwrap().last_known_assignee,
        "contractor@example.com"
    );
}

#[tokio::test]
async fn test_removed_assignee_reverts_to_firing() {
    let h = Harness::new();
    h.seed_post("fp-1", "post-1", "jane").await;
    h.backend.put_assigned("fp-1", None);

    let report = h.poller().run_cycle().await.unwrap();

    assert_eq!(report.repaired, 1);
    let (_, attachment) = h.chat.last_update().unwrap();
    assert!(attachment.title.contains("[FIRING]"));
    assert_eq!(attachment.field("Note"), Some("Assignee removed"));
    assert_eq!(h.chat.reply_texts(), vec!["Assignee removed via Keep UI".to_string()]);
    assert_eq!(h.tracked("fp-1").await.unwrap().last_known_assignee, "");
}

#[tokio::test]
async fn test_missing_and_resolved_alerts_are_skipped() {
    let h = Harness::new();
    h.seed_post("gone", "post-1", "jane").await;
    h.seed_post("done", "post-2", "jane").await;
    h.backend.put(
        "done",
        Status::Resolved,
        Enrichment {
            status: None,
            assignee: Some("bsmith".to_string()),
        },
    );

    let report = h.poller().run_cycle().await.unwrap();

    assert_eq!(report.tracked, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(h.chat.update_count(), 0);
    assert_eq!(h.tracked("done").await.unwrap().last_known_assignee, "jane");
}

#[tokio::test]
async fn test_store_failure_redetects_drift_next_cycle() {
    let h = Harness::new();
    h.seed_post("fp-1", "post-1", "jane").await;
    h.backend.put_assigned("fp-1", Some("bsmith"));
    let poller = h.poller();

    h.store.fail_save.store(true, Ordering::SeqCst);
    let first = poller.run_cycle().await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(h.chat.update_count(), 1);
    assert_eq!(h.tracked("fp-1").await.unwrap().last_known_assignee, "jane");

    h.store.fail_save.store(false, Ordering::SeqCst);
    let second = poller.run_cycle().await.unwrap();
    assert_eq!(second.repaired, 1);
    assert_eq!(h.chat.update_count(), 2);
    assert_eq!(h.chat.reply_texts().len(), 2);
    assert_eq!(h.tracked("fp-1").await.unwrap().last_known_assignee, "bob");
}

#[tokio::test]
async fn test_chat_failure_is_isolated_per_post() {
    let h = Harness::new();
    h.seed_post("fp-1", "post-1", "").await;
    h.seed_post("fp-2", "post-2", "").await;
    h.backend.put_assigned("fp-1", Some("jdoe"));
    h.backend.put_assigned("fp-2", Some("bsmith"));
    h.chat.fail_update.store(true, Ordering::SeqCst);

    let report = h.poller().run_cycle().await.unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(h.chat.update_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(h.tracked("fp-1").await.unwrap().last_known_assignee, "");
    assert_eq!(h.metrics.get(Counter::PollFailures), 2);
}

#[tokio::test]
async fn test_bulk_fetch_failure_fails_cycle() {
    let h = Harness::new();
    h.seed_post("fp-1", "post-1", "").await;
    h.backend.fail_list.store(true, Ordering::SeqCst);

    assert!(h.poller().run_cycle().await.is_err());
    assert_eq!(h.chat.update_attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_when_cancelled() {
    let h = Harness::new();
    let poller = h.poller();
    let token = CancellationToken::new();

    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(150)).await;
        stop.cancel();
    });

    tokio::time::timeout(Duration::from_secs(300), poller.run(token))
        .await
        .expect("poller stops after cancellation");

    // Immediate first tick plus one per minute until cancellation.
    assert_eq!(h.metrics.get(Counter::PollCycles), 3);
}
