//! End-to-end reconciliation against the in-memory store and cache

mod common;

use common::*;
use rankwatch_core::constants::events;
use rankwatch_core::models::{TaskKind, TrackedTask};
use rankwatch_core::orchestration::HandleOutcome;
use rankwatch_core::{CompletionReconciler, EngineStatus, ReconcilerConfig, ReconcilerError, TaskStatus};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_engine_percent_never_decreases() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "J"));

    let mut stored = Vec::new();
    for percent in [30, 10, 70] {
        harness
            .reconciler
            .handle(json!({"job_id": "J", "status": "running", "percent": percent}))
            .await
            .unwrap();
        let task = harness.task(TaskKind::KeywordTracking, 1);
        stored.push(task.engine_states().get("J").unwrap().percent);
    }

    assert_eq!(stored, vec![30, 30, 70]);
}

#[tokio::test]
async fn test_duplicate_message_is_idempotent() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "A,B"));
    let message = json!({"job_id": "A", "status": "in_progress", "percent": 64});

    harness.reconciler.handle(message.clone()).await.unwrap();
    let once = harness.task(TaskKind::KeywordTracking, 1);

    harness.reconciler.handle(message).await.unwrap();
    let twice = harness.task(TaskKind::KeywordTracking, 1);

    assert_eq!(once.progress(), twice.progress());
}

#[tokio::test]
async fn test_all_completed_yields_completed_in_either_order() {
    for order in [["A", "B"], ["B", "A"]] {
        let harness = Harness::new();
        harness.store.insert(keyword_task(1, "A,B"));

        for job_id in order {
            harness
                .reconciler
                .handle(json!({"job_id": job_id, "status": "completed", "percent": 100}))
                .await
                .unwrap();
        }

        let task = harness.task(TaskKind::KeywordTracking, 1);
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.progress().progress_percent, 100);
        assert_eq!(task.progress().processed_keywords, task.progress().total_keywords);
        assert!(task.progress().completed_at.is_some());
    }
}

#[tokio::test]
async fn test_done_alias_completes_below_hundred_percent() {
    let harness = Harness::new();
    harness.store.insert(position_task(5, "pc-5"));

    let outcome = harness
        .reconciler
        .handle(json!({"job_id": "pc-5", "status": "DONE", "percent": 87}))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        HandleOutcome::Applied {
            status: TaskStatus::Completed,
            progress_percent: 100,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failure_is_sticky() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "A,B"));

    harness
        .reconciler
        .handle(json!({"job_id": "A", "status": "error", "percent": 15, "error": "captcha wall"}))
        .await
        .unwrap();
    harness
        .reconciler
        .handle(json!({"job_id": "B", "status": "completed", "percent": 100}))
        .await
        .unwrap();

    let task = harness.task(TaskKind::KeywordTracking, 1);
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.progress().error_message.as_deref(), Some("captcha wall"));
    assert_eq!(task.engine_states().get("B").unwrap().status, EngineStatus::Completed);
}

#[tokio::test]
async fn test_partial_aggregation() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "A,B"));

    harness
        .reconciler
        .handle(json!({"job_id": "A", "percent": 50}))
        .await
        .unwrap();

    let task = harness.task(TaskKind::KeywordTracking, 1);
    assert_eq!(task.progress().progress_percent, 25);
    assert_eq!(task.status(), TaskStatus::Processing);
    assert_eq!(task.engine_states().get("B").unwrap().percent, 0);
}

#[tokio::test]
async fn test_unknown_status_passes_through_without_effect() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "A"));

    harness
        .reconciler
        .handle(json!({"job_id": "A", "status": "Queued", "percent": 0}))
        .await
        .unwrap();

    let task = harness.task(TaskKind::KeywordTracking, 1);
    let state = task.engine_states().get("A").unwrap();
    assert_eq!(state.status, EngineStatus::Processing);
    assert_eq!(state.last_reported.as_deref(), Some("queued"));
    assert_eq!(task.status(), TaskStatus::Processing);
}

#[tokio::test]
async fn test_queued_report_after_engine_completed_changes_nothing_terminal() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "A,B"));

    for message in [
        json!({"job_id": "A", "status": "completed", "percent": 100}),
        json!({"job_id": "A", "status": "queued", "percent": 0}),
    ] {
        harness.reconciler.handle(message).await.unwrap();
    }

    let task = harness.task(TaskKind::KeywordTracking, 1);
    let state = task.engine_states().get("A").unwrap();
    assert_eq!(state.status, EngineStatus::Completed);
    assert_eq!(state.percent, 100);
    assert_eq!(state.last_reported.as_deref(), Some("queued"));
    assert_eq!(task.status(), TaskStatus::Processing);
    assert_eq!(task.progress().progress_percent, 50);
}

#[tokio::test]
async fn test_queued_report_after_failure_keeps_task_failed() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "A,B"));

    for message in [
        json!({"job_id": "A", "status": "failed", "error": "blocked by captcha"}),
        json!({"job_id": "A", "status": "queued", "percent": 0}),
    ] {
        harness.reconciler.handle(message).await.unwrap();
    }

    let task = harness.task(TaskKind::KeywordTracking, 1);
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.engine_states().get("A").unwrap().status, EngineStatus::Failed);
    assert_eq!(task.progress().error_message.as_deref(), Some("blocked by captcha"));
}

#[tokio::test]
async fn test_early_messages_replay_in_arrival_order() {
    let harness = Harness::new();

    for percent in [10, 40, 90] {
        let outcome = harness
            .reconciler
            .handle(json!({"job_id": "J", "percent": percent}))
            .await
            .unwrap();
        assert!(matches!(outcome, HandleOutcome::Buffered { .. }));
    }
    assert_eq!(harness.reconciler.buffer().drain("J").await.len(), 3);

    harness.store.insert(keyword_task(1, "J,K"));
    let outcome = harness
        .reconciler
        .handle(json!({"job_id": "K", "status": "running", "percent": 20}))
        .await
        .unwrap();

    assert!(matches!(outcome, HandleOutcome::Applied { replayed: 3, .. }));
    let task = harness.task(TaskKind::KeywordTracking, 1);
    assert_eq!(task.engine_states().get("J").unwrap().percent, 90);
    assert_eq!(task.progress().progress_percent, 55);
    assert!(harness.reconciler.buffer().drain("J").await.is_empty());
    assert_eq!(harness.store.save_count(), 1);
}

#[tokio::test]
async fn test_replay_includes_current_job_id_buffer() {
    let harness = Harness::new();
    harness
        .reconciler
        .handle(json!({"job_id": "J", "status": "completed", "percent": 100}))
        .await
        .unwrap();

    harness.store.insert(position_task(3, "J"));
    // A late ping for the same job: the buffered completion still wins
    let outcome = harness
        .reconciler
        .handle(json!({"job_id": "J", "status": "running", "percent": 60}))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        HandleOutcome::Applied {
            status: TaskStatus::Completed,
            replayed: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_membership_resolution_for_late_known_job_id() {
    let harness = Harness::new();
    harness.store.insert(keyword_task(1, "g-1,y-1,b-1"));

    let outcome = harness
        .reconciler
        .handle(json!({"task_id": "y-1", "status": "processing", "percent": "33"}))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        HandleOutcome::Applied {
            task_id: 1,
            task_kind: TaskKind::KeywordTracking,
            progress_percent: 11,
            ..
        }
    ));
}

#[tokio::test]
async fn test_persistence_failure_propagates_and_keeps_buffer() {
    let store = Arc::new(FlakyTaskStore::new());
    let reconciler = CompletionReconciler::new(
        store.clone(),
        Arc::new(rankwatch_core::cache::InMemoryMessageCache::new()),
        ReconcilerConfig::default(),
    );

    reconciler
        .handle(json!({"job_id": "A", "percent": 30}))
        .await
        .unwrap();
    store.inner.insert(keyword_task(1, "A,B"));
    store.fail_saves(true);

    let err = reconciler
        .handle(json!({"job_id": "B", "percent": 10}))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcilerError::Persistence(_)));
    assert_eq!(reconciler.buffer().drain("A").await.len(), 1);
    assert_eq!(store.inner.save_count(), 0);

    // Redelivery after recovery applies the buffered message too
    store.fail_saves(false);
    let outcome = reconciler
        .handle(json!({"job_id": "B", "percent": 10}))
        .await
        .unwrap();
    assert!(matches!(outcome, HandleOutcome::Applied { replayed: 1, progress_percent: 20, .. }));
    assert!(reconciler.buffer().drain("A").await.is_empty());
}

#[tokio::test]
async fn test_lookup_failure_propagates() {
    let store = Arc::new(FlakyTaskStore::new());
    store.inner.insert(keyword_task(1, "A"));
    store.fail_lookups(true);
    let reconciler = CompletionReconciler::new(
        store,
        Arc::new(rankwatch_core::cache::InMemoryMessageCache::new()),
        ReconcilerConfig::default(),
    );

    let result = reconciler.handle(json!({"job_id": "A", "percent": 30})).await;
    assert!(matches!(result, Err(ReconcilerError::Persistence(_))));
}

#[tokio::test]
async fn test_cache_outage_degrades_to_no_pending_messages() {
    let store = Arc::new(rankwatch_core::database::InMemoryTaskStore::new());
    store.insert(keyword_task(1, "A"));
    let reconciler = CompletionReconciler::new(
        store.clone(),
        Arc::new(UnavailableCache),
        ReconcilerConfig::default(),
    );

    let outcome = reconciler
        .handle(json!({"job_id": "A", "status": "done", "percent": 100}))
        .await
        .unwrap();
    assert!(matches!(outcome, HandleOutcome::Applied { status: TaskStatus::Completed, .. }));

    let mut receiver = reconciler.events().subscribe();
    let outcome = reconciler
        .handle(json!({"job_id": "nobody", "percent": 5}))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        HandleOutcome::Unbuffered {
            job_id: "nobody".to_string()
        }
    );

    let event = receiver.try_recv().unwrap();
    assert_eq!(event.name, events::COMPLETION_DROPPED);
    assert!(receiver.try_recv().is_err());

    let summary = reconciler
        .handle_batch(vec![json!({"job_id": "nobody", "percent": 10})])
        .await;
    assert_eq!(summary.unbuffered, 1);
    assert_eq!(summary.buffered, 0);
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let harness = Harness::new();
    harness.store.insert(position_task(2, "pc-2"));
    let mut receiver = harness.reconciler.events().subscribe();

    harness.reconciler.handle(json!({"status": "done"})).await.unwrap();
    harness
        .reconciler
        .handle(json!({"job_id": "pc-2", "status": "failed"}))
        .await
        .unwrap();

    let mut names = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        names.push(event.name);
    }
    assert_eq!(
        names,
        vec![
            events::COMPLETION_DROPPED,
            events::TASK_PROGRESS_UPDATED,
            events::TASK_FAILED,
        ]
    );
}

#[tokio::test]
async fn test_batch_summary_counts_outcomes() {
    let harness = Harness::with_config(ReconcilerConfig {
        max_concurrent_messages: 4,
        ..ReconcilerConfig::default()
    });
    harness.store.insert(keyword_task(1, "A,B"));
    harness.store.insert(position_task(2, "C"));

    let summary = harness
        .reconciler
        .handle_batch(vec![
            json!({"job_id": "A", "status": "completed", "percent": 100}),
            json!({"job_id": "B", "status": "running", "percent": 40}),
            json!({"job_id": "C", "status": "error"}),
            json!({"job_id": "missing", "percent": 10}),
            json!({"percent": 10}),
        ])
        .await;

    assert_eq!(summary.processed, 5);
    assert_eq!(summary.applied, 3);
    assert_eq!(summary.buffered, 1);
    assert_eq!(summary.unbuffered, 0);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.tasks_failed, 1);
    assert_eq!(summary.tasks_completed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_engines_do_not_lose_updates() {
    let harness = Arc::new(Harness::new());
    let job_ids: Vec<String> = (0..8).map(|i| format!("engine-{i}")).collect();
    harness.store.insert(keyword_task(1, &job_ids.join(",")));

    let mut handles = Vec::new();
    for job_id in job_ids.clone() {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            harness
                .reconciler
                .handle(json!({"job_id": job_id, "status": "completed", "percent": 100}))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let task = harness.task(TaskKind::KeywordTracking, 1);
    assert_eq!(task.engine_states().len(), 8);
    assert!(job_ids
        .iter()
        .all(|id| task.engine_states().get(id).unwrap().is_completed()));
    assert_eq!(task.status(), TaskStatus::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reconcilers_sharing_a_store_do_not_lose_updates() {
    let store = Arc::new(rankwatch_core::database::InMemoryTaskStore::new());
    let job_ids: Vec<String> = (0..8).map(|i| format!("engine-{i}")).collect();
    store.insert(keyword_task(1, &job_ids.join(",")));

    // Separate lock tables, as two service instances would have
    let reconcilers: Vec<Arc<CompletionReconciler>> = (0..2)
        .map(|_| {
            Arc::new(CompletionReconciler::new(
                store.clone(),
                Arc::new(rankwatch_core::cache::InMemoryMessageCache::new()),
                ReconcilerConfig::default(),
            ))
        })
        .collect();

    let mut handles = Vec::new();
    for (i, job_id) in job_ids.clone().into_iter().enumerate() {
        let reconciler = Arc::clone(&reconcilers[i % 2]);
        handles.push(tokio::spawn(async move {
            reconciler
                .handle(json!({"job_id": job_id, "status": "completed", "percent": 100}))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let task = store.get(TaskKind::KeywordTracking, 1).unwrap();
    assert!(job_ids
        .iter()
        .all(|id| task.engine_states().get(id).unwrap().is_completed()));
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(store.save_count(), 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_task_created_while_messages_buffer_is_eventually_consistent() {
    let harness = Arc::new(Harness::new());

    let writer = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            for percent in (10..=100).step_by(10) {
                harness
                    .reconciler
                    .handle(json!({"job_id": "Z", "percent": percent}))
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    harness.store.insert(position_task(9, "Z"));
    writer.await.unwrap();

    // A final ping flushes anything still buffered
    harness
        .reconciler
        .handle(json!({"job_id": "Z", "percent": 0}))
        .await
        .unwrap();

    let task = harness.task(TaskKind::PositionCheck, 9);
    assert_eq!(task.engine_states().get("Z").unwrap().percent, 100);
    assert!(harness.reconciler.buffer().drain("Z").await.is_empty());
}
