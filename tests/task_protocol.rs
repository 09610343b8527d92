// tests/task_protocol.rs

mod common;
use crate::common::{BlueprintBuilder, TestEngine, init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Barrier;

use judgedag::model::{Args, JudgeStatus, Slot};
use judgedag::process::Task;
use judgedag::service::{ServiceError, TaskService, UpdateTask};

/// Start a judgement whose only block is external and wait until it queues.
async fn queued_task(engine: &TestEngine, kind: &str) -> Task {
    let bp = BlueprintBuilder::new()
        .block(1, kind, json!({}))
        .block(2, "result", json!({}))
        .link(10, (1, 0), (2, 0));
    engine.store.insert_blueprint(bp.blueprint(1));
    let j = engine.repos.judgements.create(1, Args::new()).unwrap();
    engine.dispatcher.submit(j.id).await.unwrap();

    let tasks = engine.tasks();
    with_timeout(async {
        loop {
            if let Some(t) = tasks.get_tasks(kind).pop() {
                return t;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_have_one_winner() {
    init_tracing();
    let engine = TestEngine::new();
    let task = queued_task(&engine, "run").await;

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::new();
    for _ in 0..contenders {
        let tasks: TaskService = engine.tasks();
        let barrier = barrier.clone();
        let id = task.task_id.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            tasks.reserve_task(&id)
        }));
    }

    let mut wins = 0;
    let mut rejections = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(ServiceError::Precondition(_)) => rejections += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(rejections, contenders - 1);
}

#[tokio::test]
async fn expired_reservation_is_fetchable_again() {
    init_tracing();
    let engine = TestEngine::new();
    let tasks = engine.tasks();
    let task = queued_task(&engine, "run").await;

    tasks.reserve_task(&task.task_id).unwrap();
    assert!(tasks.get_tasks("run").is_empty());

    // TestEngine uses a 200ms TTL.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let again = tasks.get_tasks("run");
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].task_id, task.task_id);
}

#[tokio::test]
async fn stale_holder_cannot_finish_after_reclaim() {
    init_tracing();
    let engine = TestEngine::new();
    let tasks = engine.tasks();
    let mut rx = engine.dispatcher.subscribe();
    let task = queued_task(&engine, "run").await;

    let slow = tasks.reserve_task(&task.task_id).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let fresh = tasks.reserve_task(&task.task_id).unwrap();
    assert!(fresh.epoch > slow.epoch);

    let late = tasks.update_task(
        &task.task_id,
        UpdateTask {
            token: slow.token,
            outputs: vec![Slot::int(0)],
            ..UpdateTask::default()
        },
    );
    assert!(matches!(late, Err(ServiceError::Conflict(_))));

    tasks
        .update_task(
            &task.task_id,
            UpdateTask {
                token: fresh.token,
                outputs: vec![Slot::int(100)],
                ..UpdateTask::default()
            },
        )
        .unwrap();

    let j = with_timeout(TestEngine::finished(&mut rx, task.judgement_id)).await;
    assert_eq!(j.status, JudgeStatus::Accepted);
}

#[tokio::test]
async fn get_task_ignores_locks() {
    init_tracing();
    let engine = TestEngine::new();
    let tasks = engine.tasks();
    let task = queued_task(&engine, "run").await;

    tasks.reserve_task(&task.task_id).unwrap();
    assert_eq!(tasks.get_task(&task.task_id).unwrap().block_id, 1);
    assert!(matches!(tasks.get_task("missing"), Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn released_reservation_is_offered_before_ttl() {
    init_tracing();
    let engine = TestEngine::new();
    let tasks = engine.tasks();
    let mut rx = engine.dispatcher.subscribe();
    let task = queued_task(&engine, "run").await;

    let held = tasks.reserve_task(&task.task_id).unwrap();
    assert!(tasks.get_tasks("run").is_empty());
    tasks.unlock_task(&task.task_id, &held.token).unwrap();

    // Well inside the 200ms TTL.
    let again = tasks.get_tasks("run");
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].task_id, task.task_id);

    let next = tasks.reserve_task(&task.task_id).unwrap();
    assert!(matches!(
        tasks.unlock_task(&task.task_id, &held.token),
        Err(ServiceError::Conflict(_))
    ));
    assert!(matches!(
        tasks.unlock_task("missing", &next.token),
        Err(ServiceError::NotFound(_))
    ));

    tasks
        .update_task(
            &task.task_id,
            UpdateTask {
                token: next.token,
                outputs: vec![Slot::int(100)],
                ..UpdateTask::default()
            },
        )
        .unwrap();
    let j = with_timeout(TestEngine::finished(&mut rx, task.judgement_id)).await;
    assert_eq!(j.status, JudgeStatus::Accepted);
}
