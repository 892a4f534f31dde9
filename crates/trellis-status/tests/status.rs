//! Status machine and sub-task tests over the public service API.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use trellis_status::{
  Assignment, Cause, ChannelNotifier, FsWorkflowCatalog, StatusError, StatusService, SubTaskUpdate,
  WorkflowCatalog,
};
use trellis_store::{MemoryStore, NodeStatus, Schedule, SqliteStore, Store, SubTask};
use trellis_workflow::{Node, Workflow};

const TASK: &str = "task-1";

fn diamond() -> Workflow {
  Workflow::new(
    "diamond",
    "Diamond",
    vec![
      Node::new("start", "Start").with_next(["a", "b"]),
      Node::new("a", "A").with_next(["end"]),
      Node::new("b", "B").with_next(["end"]),
      Node::new("end", "End"),
    ],
  )
  .unwrap()
}

fn chain() -> Workflow {
  Workflow::new(
    "chain",
    "Chain",
    vec![
      Node::new("A", "A").start().with_next(["B"]),
      Node::new("B", "B").with_next(["C"]),
      Node::new("C", "C"),
    ],
  )
  .unwrap()
}

fn catalog(workflow: Workflow) -> WorkflowCatalog {
  let mut catalog = WorkflowCatalog::new();
  let workflow_type = workflow.workflow_id.clone();
  catalog.register(workflow_type.clone(), workflow);
  catalog.assign(TASK, workflow_type).unwrap();
  catalog
}

fn service(workflow: Workflow) -> StatusService<MemoryStore, WorkflowCatalog> {
  StatusService::new(MemoryStore::new(), catalog(workflow))
}

fn changed(outcome: &trellis_status::TransitionOutcome) -> Vec<(&str, NodeStatus)> {
  outcome
    .changes
    .iter()
    .map(|r| (r.node_id.as_str(), r.status))
    .collect()
}

async fn status_of<S: Store>(
  service: &StatusService<S, WorkflowCatalog>,
  node_id: &str,
) -> NodeStatus {
  service.get_or_create(TASK, node_id).await.unwrap().status
}

#[tokio::test]
async fn test_initial_statuses() {
  let service = service(diamond());
  let records = service.list_node_statuses(TASK).await.unwrap();

  let statuses: Vec<(&str, NodeStatus)> = records
    .iter()
    .map(|r| (r.node_id.as_str(), r.status))
    .collect();
  assert_eq!(
    statuses,
    vec![
      ("start", NodeStatus::InProgress),
      ("a", NodeStatus::Pending),
      ("b", NodeStatus::Pending),
      ("end", NodeStatus::Pending),
    ]
  );
  assert_eq!(service.store().list_records(TASK).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_diamond_advances() {
  let service = service(diamond());

  let outcome = service.complete(TASK, "start").await.unwrap();
  assert!(outcome.success);
  assert_eq!(
    changed(&outcome),
    vec![
      ("start", NodeStatus::Completed),
      ("a", NodeStatus::InProgress),
      ("b", NodeStatus::InProgress),
    ]
  );

  // `end` waits for `b`.
  let outcome = service.complete(TASK, "a").await.unwrap();
  assert_eq!(changed(&outcome), vec![("a", NodeStatus::Completed)]);
  assert_eq!(status_of(&service, "end").await, NodeStatus::Pending);

  let outcome = service.complete(TASK, "b").await.unwrap();
  assert_eq!(
    changed(&outcome),
    vec![("b", NodeStatus::Completed), ("end", NodeStatus::InProgress)]
  );

  let progress = service.progress(TASK).await.unwrap();
  assert_eq!((progress.pending, progress.in_progress, progress.completed), (0, 1, 3));
  assert!(!progress.is_finished());

  service.complete(TASK, "end").await.unwrap();
  assert!(service.progress(TASK).await.unwrap().is_finished());
}

#[tokio::test]
async fn test_complete_pending_is_invalid() {
  let service = service(diamond());
  let err = service.complete(TASK, "a").await.unwrap_err();
  assert!(matches!(
    err,
    StatusError::InvalidTransition {
      ref node_id,
      from: NodeStatus::Pending,
      to: NodeStatus::Completed,
    } if node_id == "a"
  ));

  // Nothing was written by the failed attempt.
  assert!(service.store().get_record(TASK, "a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_complete_twice_is_invalid() {
  let service = service(diamond());
  service.complete(TASK, "start").await.unwrap();
  let err = service.complete(TASK, "start").await.unwrap_err();
  assert!(matches!(
    err,
    StatusError::InvalidTransition {
      from: NodeStatus::Completed,
      ..
    }
  ));
}

#[tokio::test]
async fn test_rollback_resets_descendants() {
  let service = service(chain());
  service.complete(TASK, "A").await.unwrap();
  service.complete(TASK, "B").await.unwrap();
  service.complete(TASK, "C").await.unwrap();

  let outcome = service.rollback(TASK, "A").await.unwrap();
  assert_eq!(
    changed(&outcome),
    vec![
      ("A", NodeStatus::InProgress),
      ("B", NodeStatus::Pending),
      ("C", NodeStatus::Pending),
    ]
  );
  assert_eq!(status_of(&service, "A").await, NodeStatus::InProgress);
  assert_eq!(status_of(&service, "B").await, NodeStatus::Pending);
  assert_eq!(status_of(&service, "C").await, NodeStatus::Pending);
}

#[tokio::test]
async fn test_rollback_requires_completed() {
  let service = service(chain());
  let err = service.rollback(TASK, "A").await.unwrap_err();
  assert!(matches!(
    err,
    StatusError::InvalidTransition {
      from: NodeStatus::InProgress,
      to: NodeStatus::InProgress,
      ..
    }
  ));
}

#[tokio::test]
async fn test_transition_dispatch() {
  let service = service(chain());

  let noop = service
    .transition(TASK, "A", NodeStatus::InProgress)
    .await
    .unwrap();
  assert!(!noop.success);
  assert!(noop.changes.is_empty());

  let done = service
    .transition(TASK, "A", NodeStatus::Completed)
    .await
    .unwrap();
  assert!(done.success);
  assert_eq!(done.changes.len(), 2);

  let back = service
    .transition(TASK, "A", NodeStatus::InProgress)
    .await
    .unwrap();
  assert_eq!(
    changed(&back),
    vec![("A", NodeStatus::InProgress), ("B", NodeStatus::Pending)]
  );

  let err = service
    .transition(TASK, "A", NodeStatus::Pending)
    .await
    .unwrap_err();
  assert!(matches!(err, StatusError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_events_follow_changes() {
  let (notifier, mut events) = ChannelNotifier::channel();
  let service = StatusService::with_notifier(MemoryStore::new(), catalog(diamond()), notifier);

  service.complete(TASK, "start").await.unwrap();

  let mut received = Vec::new();
  while let Ok(event) = events.try_recv() {
    received.push((event.node_id, event.from, event.to, event.cause));
  }
  assert_eq!(
    received,
    vec![
      (
        "start".to_string(),
        NodeStatus::InProgress,
        NodeStatus::Completed,
        Cause::Completed
      ),
      (
        "a".to_string(),
        NodeStatus::Pending,
        NodeStatus::InProgress,
        Cause::Unlocked
      ),
      (
        "b".to_string(),
        NodeStatus::Pending,
        NodeStatus::InProgress,
        Cause::Unlocked
      ),
    ]
  );
}

#[tokio::test]
async fn test_unknown_task_and_node() {
  let service = service(diamond());

  let err = service.list_node_statuses("task-9").await.unwrap_err();
  assert!(matches!(err, StatusError::TaskNotFound(ref id) if id == "task-9"));

  let err = service.complete(TASK, "ghost").await.unwrap_err();
  assert!(matches!(err, StatusError::NodeNotFound { ref node_id, .. } if node_id == "ghost"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_unlock_join_once() {
  let service = Arc::new(service(diamond()));
  service.complete(TASK, "start").await.unwrap();

  let handles: Vec<_> = ["a", "b"]
    .into_iter()
    .map(|node_id| {
      let service = Arc::clone(&service);
      tokio::spawn(async move { service.complete(TASK, node_id).await })
    })
    .collect();

  let mut unlocked = 0;
  for handle in handles {
    let outcome = handle.await.unwrap().unwrap();
    unlocked += outcome
      .changes
      .iter()
      .filter(|r| r.node_id == "end" && r.status == NodeStatus::InProgress)
      .count();
  }
  assert_eq!(unlocked, 1);
  assert_eq!(status_of(service.as_ref(), "end").await, NodeStatus::InProgress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_transition_is_idempotent() {
  for _ in 0..50 {
    let service = Arc::new(service(diamond()));

    let handles: Vec<_> = (0..2)
      .map(|_| {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
          service
            .transition(TASK, "start", NodeStatus::Completed)
            .await
        })
      })
      .collect();

    let mut succeeded = 0;
    for handle in handles {
      let outcome = handle.await.unwrap().unwrap();
      if outcome.success {
        succeeded += 1;
      } else {
        assert!(outcome.changes.is_empty());
      }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(status_of(service.as_ref(), "start").await, NodeStatus::Completed);
  }
}

#[tokio::test]
async fn test_assignment_is_partial() {
  let service = service(diamond());
  let schedule = Schedule {
    start: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
    end: Utc.with_ymd_and_hms(2026, 6, 5, 0, 0, 0).unwrap(),
  };

  service
    .update_assignment(
      TASK,
      "a",
      Assignment {
        maintainer_id: Some("ana".to_string()),
        schedule: None,
      },
    )
    .await
    .unwrap();
  let record = service
    .update_assignment(
      TASK,
      "a",
      Assignment {
        maintainer_id: None,
        schedule: Some(schedule),
      },
    )
    .await
    .unwrap();

  assert_eq!(record.maintainer_id.as_deref(), Some("ana"));
  assert_eq!(record.maintainer_schedule, Some(schedule));
  assert_eq!(record.status, NodeStatus::Pending);
}

#[tokio::test]
async fn test_sub_task_names_unique_per_node() {
  let service = service(diamond());

  service
    .create_sub_task(TASK, "a", SubTask::new("draft"))
    .await
    .unwrap();
  let err = service
    .create_sub_task(TASK, "a", SubTask::new("draft"))
    .await
    .unwrap_err();
  assert!(matches!(err, StatusError::Conflict { ref name, .. } if name == "draft"));

  service
    .create_sub_task(TASK, "b", SubTask::new("draft"))
    .await
    .unwrap();
  assert_eq!(service.list_sub_tasks(TASK, "a").await.unwrap().len(), 1);
  assert_eq!(service.list_sub_tasks(TASK, "b").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sub_task_update_and_remove() {
  let service = service(diamond());
  service
    .create_sub_task(TASK, "a", SubTask::new("draft"))
    .await
    .unwrap();
  service
    .create_sub_task(TASK, "a", SubTask::new("review"))
    .await
    .unwrap();

  let err = service
    .update_sub_task(
      TASK,
      "a",
      "draft",
      SubTaskUpdate {
        rename: Some("review".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, StatusError::Conflict { .. }));

  let updated = service
    .update_sub_task(
      TASK,
      "a",
      "draft",
      SubTaskUpdate {
        rename: Some("write".to_string()),
        maintainer_id: Some("bo".to_string()),
        schedule: None,
      },
    )
    .await
    .unwrap();
  assert_eq!(updated.name, "write");
  assert_eq!(updated.maintainer_id.as_deref(), Some("bo"));

  let err = service
    .update_sub_task(TASK, "a", "draft", SubTaskUpdate::default())
    .await
    .unwrap_err();
  assert!(matches!(err, StatusError::SubTaskNotFound { .. }));

  let err = service
    .update_sub_task(
      TASK,
      "a",
      "draft",
      SubTaskUpdate {
        rename: Some("review".to_string()),
        ..Default::default()
      },
    )
    .await
    .unwrap_err();
  assert!(matches!(err, StatusError::SubTaskNotFound { ref name, .. } if name == "draft"));

  let removed = service.remove_sub_task(TASK, "a", "review").await.unwrap();
  assert_eq!(removed.name, "review");
  let names: Vec<String> = service
    .list_sub_tasks(TASK, "a")
    .await
    .unwrap()
    .into_iter()
    .map(|s| s.name)
    .collect();
  assert_eq!(names, vec!["write"]);

  let err = service.remove_sub_task(TASK, "a", "review").await.unwrap_err();
  assert!(matches!(err, StatusError::SubTaskNotFound { .. }));
}

#[tokio::test]
async fn test_sub_tasks_survive_status_changes() {
  let service = service(diamond());
  service
    .create_sub_task(TASK, "start", SubTask::new("kickoff"))
    .await
    .unwrap();
  service.complete(TASK, "start").await.unwrap();

  let record = service.get_or_create(TASK, "start").await.unwrap();
  assert_eq!(record.status, NodeStatus::Completed);
  assert_eq!(record.sub_tasks, vec![SubTask::new("kickoff")]);
}

#[tokio::test]
async fn test_sqlite_backed_service() {
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .unwrap();
  let store = SqliteStore::new(pool);
  store.migrate().await.unwrap();

  let service = StatusService::new(store, catalog(chain()));
  service.complete(TASK, "A").await.unwrap();
  service.complete(TASK, "B").await.unwrap();
  service.rollback(TASK, "A").await.unwrap();

  let statuses: Vec<NodeStatus> = service
    .list_node_statuses(TASK)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.status)
    .collect();
  assert_eq!(
    statuses,
    vec![NodeStatus::InProgress, NodeStatus::Pending, NodeStatus::Pending]
  );
}

#[tokio::test]
async fn test_fs_catalog() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(
    dir.path().join("review.json"),
    json!({
      "workflowId": "review",
      "name": "Review",
      "nodes": {
        "start": { "name": "Start", "nextNodes": ["done"] },
        "done": { "name": "Done", "prevNodes": ["start"] }
      }
    })
    .to_string(),
  )
  .unwrap();
  std::fs::write(
    dir.path().join("tasks.json"),
    json!({ "task-1": "review" }).to_string(),
  )
  .unwrap();

  let catalog = FsWorkflowCatalog::load(dir.path()).await.unwrap();
  assert_eq!(catalog.catalog().workflow_type_of(TASK), Some("review"));

  let service = StatusService::new(MemoryStore::new(), catalog);
  let outcome = service.complete(TASK, "start").await.unwrap();
  assert_eq!(
    changed(&outcome),
    vec![("start", NodeStatus::Completed), ("done", NodeStatus::InProgress)]
  );
}
