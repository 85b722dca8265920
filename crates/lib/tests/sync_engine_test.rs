//! # Sync Engine Tests
//!
//! Covers the local-first write path, the outbox drain and its retry bound,
//! and the background tasks that drain on reconnect.

use anyhow::Result;
use coursesync::constants::MAX_SYNC_RETRIES;
use coursesync::types::{
    ForumPostOutcome, ForumPostRecord, NewForumPost, NewForumReply, OutboxItem, OutboxKind,
    ProgressRecord, ProgressUpdate, QuizAttemptRecord, QuizSubmission,
};
use coursesync::{HttpRemoteApi, PermanentFailureHook, SyncEngine, SyncError};
use coursesync_test_utils::{
    mount_failing_write_endpoints, mount_json, mount_write_endpoints, TestSetup,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn progress_update(lesson: &str, percent: f64) -> ProgressUpdate {
    ProgressUpdate {
        user_id: "u1".to_string(),
        course_id: "c1".to_string(),
        lesson_id: Some(lesson.to_string()),
        completed: percent >= 100.0,
        percent,
        time_spent: 60,
    }
}

fn quiz_submission(quiz: &str) -> QuizSubmission {
    QuizSubmission {
        user_id: "u1".to_string(),
        quiz_id: quiz.to_string(),
        answers: BTreeMap::from([("q1".to_string(), 0)]),
        score: 100.0,
    }
}

fn new_post(title: &str) -> NewForumPost {
    NewForumPost {
        user_id: "u1".to_string(),
        course_id: Some("c1".to_string()),
        title: title.to_string(),
        content: "How do lifetimes interact with async?".to_string(),
    }
}

/// Polls `pending_count` until the outbox is empty or the deadline passes.
async fn wait_for_empty_outbox(engine: &SyncEngine) -> Result<bool> {
    for _ in 0..100 {
        if engine.pending_count().await? == 0 {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(false)
}

// --- Write path ---

#[tokio::test]
async fn test_online_progress_is_synced_immediately() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(true).await?;
    mount_write_endpoints(&setup.server).await;

    // --- Act ---
    let record = setup.client.sync.save_progress(progress_update("l1", 40.0)).await?;

    // --- Assert ---
    assert!(record.synced);
    assert_eq!(setup.client.sync.pending_count().await?, 0);
    assert_eq!(setup.requests_to("POST", "/api/progress").await, 1);
    let stored: Option<ProgressRecord> = setup.store.get(&record.id).await?;
    assert!(stored.is_some_and(|p| p.synced));
    Ok(())
}

#[tokio::test]
async fn test_online_failure_keeps_record_and_queues_it() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(true).await?;
    mount_failing_write_endpoints(&setup.server).await;

    // --- Act ---
    let record = setup.client.sync.save_progress(progress_update("l1", 40.0)).await?;

    // --- Assert ---
    assert!(!record.synced);
    let stored: Option<ProgressRecord> = setup.store.get(&record.id).await?;
    assert!(stored.is_some_and(|p| !p.synced));
    let items = setup.client.sync.outbox_items().await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, OutboxKind::Progress);
    assert_eq!(items[0].retry_count, 0);
    Ok(())
}

#[tokio::test]
async fn test_timeout_is_treated_as_a_network_failure() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(true).await?;
    Mock::given(method("POST"))
        .and(path("/api/quiz/submit"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&setup.server)
        .await;
    let impatient = HttpRemoteApi::new(&setup.server.uri(), Duration::from_millis(200))?;
    let engine = SyncEngine::new(
        setup.store.clone(),
        Box::new(impatient),
        setup.connectivity.clone(),
        setup.client.ai.clone(),
    );

    // --- Act ---
    let attempt = engine.submit_quiz_attempt(quiz_submission("q1")).await?;

    // --- Assert ---
    assert!(!attempt.synced);
    assert_eq!(engine.pending_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_offline_writes_skip_the_network() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;

    // --- Act ---
    let progress = setup.client.sync.save_progress(progress_update("l1", 10.0)).await?;
    let attempt = setup.client.sync.submit_quiz_attempt(quiz_submission("q1")).await?;
    let post = setup.client.sync.create_forum_post(new_post("Lifetimes")).await?;

    // --- Assert ---
    assert!(!progress.synced);
    assert!(!attempt.synced);
    assert!(matches!(post, ForumPostOutcome::Created(ref p) if p.has_local_id() && !p.synced));
    let kinds: Vec<OutboxKind> = setup
        .client
        .sync
        .outbox_items()
        .await?
        .into_iter()
        .map(|item| item.kind)
        .collect();
    assert_eq!(kinds, vec![OutboxKind::Progress, OutboxKind::Quiz, OutboxKind::Forum]);
    assert_eq!(setup.total_requests().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_saving_the_same_progress_twice_keeps_one_row() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;

    // --- Act ---
    setup.client.sync.save_progress(progress_update("l1", 25.0)).await?;
    setup.client.sync.save_progress(progress_update("l1", 75.0)).await?;

    // --- Assert ---
    let rows = setup.client.sync.get_progress("u1", "c1").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].percent, 75.0);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_offline_forum_post_is_suppressed() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;

    // --- Act ---
    let first = setup.client.sync.create_forum_post(new_post("Lifetimes")).await?;
    let second = setup.client.sync.create_forum_post(new_post("Lifetimes")).await?;

    // --- Assert ---
    assert!(matches!(first, ForumPostOutcome::Created(_)));
    match second {
        ForumPostOutcome::Duplicate(existing) => assert_eq!(existing.id, first.post().id),
        other => panic!("Expected a duplicate, got {other:?}"),
    }
    assert_eq!(setup.store.count::<ForumPostRecord>().await?, 1);
    assert_eq!(setup.client.sync.pending_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_non_finite_percent_is_rejected_and_reads_keep_working() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.save_progress(progress_update("l1", 40.0)).await?;

    // --- Act ---
    let nan = setup.client.sync.save_progress(progress_update("l2", f64::NAN)).await;
    let inf = setup.client.sync.save_progress(progress_update("l1", f64::INFINITY)).await;

    // --- Assert ---
    assert!(matches!(nan, Err(SyncError::NonFinite { field: "percent", .. })));
    assert!(matches!(inf, Err(SyncError::NonFinite { field: "percent", .. })));
    let rows = setup.client.sync.get_progress("u1", "c1").await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].percent, 40.0);
    assert_eq!(setup.client.sync.pending_count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_non_finite_score_is_rejected_and_reads_keep_working() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.submit_quiz_attempt(quiz_submission("q1")).await?;
    let mut bad = quiz_submission("q1");
    bad.score = f64::NAN;

    // --- Act ---
    let result = setup.client.sync.submit_quiz_attempt(bad).await;

    // --- Assert ---
    assert!(matches!(result, Err(SyncError::NonFinite { field: "score", .. })));
    let attempts = setup.client.sync.get_quiz_attempts("u1", "q1").await?;
    assert_eq!(attempts.len(), 1);
    assert_eq!(setup.client.sync.pending_count().await?, 1);

    mount_write_endpoints(&setup.server).await;
    setup.connectivity.set_online(true);
    let report = setup.client.sync.sync_pending_data().await?;
    assert_eq!(report.synced, 1);
    assert_eq!(report.retried, 0);
    Ok(())
}

#[tokio::test]
async fn test_quiz_attempts_accumulate() -> Result<()> {
    let setup = TestSetup::new(false).await?;

    setup.client.sync.submit_quiz_attempt(quiz_submission("q1")).await?;
    tokio::time::sleep(Duration::from_millis(2)).await;
    setup.client.sync.submit_quiz_attempt(quiz_submission("q1")).await?;
    setup.client.sync.submit_quiz_attempt(quiz_submission("q2")).await?;

    let attempts = setup.client.sync.get_quiz_attempts("u1", "q1").await?;
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].completed_at <= attempts[1].completed_at);
    Ok(())
}

// --- Drain ---

#[tokio::test]
async fn test_drain_replays_every_queued_progress_item() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    for lesson in ["l1", "l2", "l3"] {
        setup.client.sync.save_progress(progress_update(lesson, 50.0)).await?;
    }
    mount_write_endpoints(&setup.server).await;
    setup.connectivity.set_online(true);

    // --- Act ---
    let report = setup.client.sync.sync_pending_data().await?;

    // --- Assert ---
    assert_eq!(report.attempted, 3);
    assert_eq!(report.synced, 3);
    assert!(!report.skipped);
    assert_eq!(setup.client.sync.pending_count().await?, 0);
    let rows = setup.client.sync.get_progress("u1", "c1").await?;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|p| p.synced));
    assert_eq!(setup.requests_to("POST", "/api/progress").await, 3);
    Ok(())
}

#[tokio::test]
async fn test_offline_quiz_attempt_syncs_after_reconnect() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.submit_quiz_attempt(quiz_submission("q1")).await?;
    let before: Vec<QuizAttemptRecord> = setup.client.sync.get_quiz_attempts("u1", "q1").await?;
    assert_eq!(before.len(), 1);
    assert!(!before[0].synced);

    // --- Act ---
    mount_write_endpoints(&setup.server).await;
    setup.connectivity.set_online(true);
    let report = setup.client.sync.sync_pending_data().await?;

    // --- Assert ---
    assert_eq!(report.synced, 1);
    let after = setup.client.sync.get_quiz_attempts("u1", "q1").await?;
    assert_eq!(after.len(), 1);
    assert!(after[0].synced);
    assert_eq!(setup.client.sync.pending_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_item_is_abandoned_after_max_retries_for_every_kind() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    let abandoned: Arc<Mutex<Vec<OutboxItem>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&abandoned);
    let hook: PermanentFailureHook = Arc::new(move |item: &OutboxItem| {
        sink.lock().unwrap().push(item.clone());
    });
    let engine = SyncEngine::new(
        setup.store.clone(),
        Box::new(setup.remote()),
        setup.connectivity.clone(),
        setup.client.ai.clone(),
    )
    .with_permanent_failure_hook(hook);

    let progress = engine.save_progress(progress_update("l1", 10.0)).await?;
    engine.submit_quiz_attempt(quiz_submission("q1")).await?;
    engine.create_forum_post(new_post("Lifetimes")).await?;
    setup.client.ai.query("What is a trait?", Some("c1"), None).await;
    assert_eq!(engine.pending_count().await?, 4);

    mount_failing_write_endpoints(&setup.server).await;
    setup.connectivity.set_online(true);

    // --- Act & Assert ---
    for attempt in 1..MAX_SYNC_RETRIES {
        let report = engine.sync_pending_data().await?;
        assert_eq!(report.retried, 4, "attempt {attempt} should keep every item");
        assert_eq!(report.abandoned, 0);
        assert!(engine
            .outbox_items()
            .await?
            .iter()
            .all(|item| item.retry_count == attempt));
    }

    let last = engine.sync_pending_data().await?;
    assert_eq!(last.abandoned, 4);
    assert_eq!(engine.pending_count().await?, 0);

    let abandoned = abandoned.lock().unwrap();
    assert_eq!(abandoned.len(), 4);
    assert!(abandoned.iter().all(|item| item.retry_count == MAX_SYNC_RETRIES));

    let stored: Option<ProgressRecord> = setup.store.get(&progress.id).await?;
    assert!(stored.is_some_and(|p| !p.synced), "Abandoned records stay unsynced");
    Ok(())
}

#[tokio::test]
async fn test_drain_while_offline_is_skipped() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.save_progress(progress_update("l1", 10.0)).await?;

    // --- Act ---
    let report = setup.client.sync.sync_pending_data().await?;

    // --- Assert ---
    assert!(report.skipped);
    assert_eq!(report.attempted, 0);
    let items = setup.client.sync.outbox_items().await?;
    assert_eq!(items[0].retry_count, 0, "No retries are spent offline");
    assert_eq!(setup.total_requests().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_drains_do_not_overlap() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.save_progress(progress_update("l1", 10.0)).await?;
    Mock::given(method("POST"))
        .and(path("/api/progress"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .mount(&setup.server)
        .await;
    setup.connectivity.set_online(true);

    // --- Act ---
    let (first, second) = tokio::join!(
        setup.client.sync.sync_pending_data(),
        setup.client.sync.sync_pending_data()
    );

    // --- Assert ---
    let reports = [first?, second?];
    assert_eq!(reports.iter().filter(|r| r.skipped).count(), 1);
    assert_eq!(reports.iter().map(|r| r.synced).sum::<usize>(), 1);
    assert_eq!(setup.requests_to("POST", "/api/progress").await, 1);
    Ok(())
}

#[tokio::test]
async fn test_newer_progress_is_not_marked_synced_by_an_older_replay() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.save_progress(progress_update("l1", 20.0)).await?;
    let latest = setup.client.sync.save_progress(progress_update("l1", 90.0)).await?;
    mount_write_endpoints(&setup.server).await;
    setup.connectivity.set_online(true);

    // --- Act ---
    let report = setup.client.sync.sync_pending_data().await?;

    // --- Assert ---
    assert_eq!(report.synced, 2);
    let stored: Option<ProgressRecord> = setup.store.get(&latest.id).await?;
    let stored = stored.expect("progress row");
    assert_eq!(stored.percent, 90.0);
    assert!(stored.synced);
    Ok(())
}

// --- Forum ---

#[tokio::test]
async fn test_online_forum_post_takes_the_server_id() -> Result<()> {
    let setup = TestSetup::new(true).await?;
    mount_write_endpoints(&setup.server).await;

    let outcome = setup.client.sync.create_forum_post(new_post("Generics")).await?;

    let post = outcome.post();
    assert_eq!(post.id, "post-100");
    assert!(post.synced);
    assert_eq!(setup.store.count::<ForumPostRecord>().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_queued_forum_post_is_rekeyed_with_its_replies() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    let outcome = setup.client.sync.create_forum_post(new_post("Lifetimes")).await?;
    let local_id = outcome.post().id.clone();
    setup
        .client
        .sync
        .add_forum_reply(NewForumReply {
            post_id: local_id.clone(),
            user_id: "u2".to_string(),
            content: "Same question here.".to_string(),
        })
        .await?;
    mount_json(&setup.server, "POST", "/api/forum/posts", 201, json!({ "post": { "id": 77 } }))
        .await;
    setup.connectivity.set_online(true);

    // --- Act ---
    setup.client.sync.sync_pending_data().await?;

    // --- Assert ---
    let posts = setup.client.sync.get_forum_posts(Some("c1")).await?;
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].id, "77");
    assert!(posts[0].synced);
    assert_eq!(posts[0].replies.len(), 1);
    assert_eq!(posts[0].replies[0].post_id, "77");
    let old: Option<ForumPostRecord> = setup.store.get(&local_id).await?;
    assert!(old.is_none());
    Ok(())
}

// --- Background tasks ---

#[tokio::test]
async fn test_reconnect_listener_drains_on_transition() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.save_progress(progress_update("l1", 30.0)).await?;
    mount_write_endpoints(&setup.server).await;
    let tasks = setup.client.start();
    assert_eq!(tasks.len(), 1, "No background interval is configured");

    // --- Act ---
    setup.connectivity.set_online(true);

    // --- Assert ---
    assert!(wait_for_empty_outbox(&setup.client.sync).await?);
    let rows = setup.client.sync.get_progress("u1", "c1").await?;
    assert!(rows[0].synced);
    Ok(())
}

#[tokio::test]
async fn test_background_sync_drains_periodically() -> Result<()> {
    // --- Arrange ---
    let setup = TestSetup::new(false).await?;
    setup.client.sync.submit_quiz_attempt(quiz_submission("q1")).await?;
    mount_write_endpoints(&setup.server).await;
    let handle = setup
        .client
        .sync
        .spawn_background_sync(Some(Duration::from_millis(50)))
        .expect("interval configured");

    // --- Act ---
    // No reconnect listener runs, so only the periodic task can drain.
    setup.connectivity.set_online(true);

    // --- Assert ---
    assert!(wait_for_empty_outbox(&setup.client.sync).await?);
    handle.abort();
    assert!(setup.client.sync.spawn_background_sync(None).is_none());
    Ok(())
}

#[tokio::test]
async fn test_reachability_check_follows_server_health() -> Result<()> {
    let setup = TestSetup::new(true).await?;

    assert!(!setup.client.refresh_connectivity().await, "404 means unreachable");
    assert!(!setup.connectivity.is_online());

    mount_json(&setup.server, "GET", "/api/health", 200, json!({ "status": "ok" })).await;
    assert!(setup.client.refresh_connectivity().await);
    assert!(setup.connectivity.is_online());
    Ok(())
}
