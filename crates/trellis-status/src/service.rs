//! Node status state machine.
//!
//! Nodes move `pending -> in_progress -> completed`; the only way back is a
//! rollback from `completed` to `in_progress`, which resets every descendant
//! to `pending`. Completing a node unlocks each direct successor whose
//! predecessors are then all completed.
//!
//! Records are created lazily: a node that was never addressed reads as its
//! initial status (`in_progress` for the start node, `pending` otherwise).
//! Every operation that writes runs under a per-task lock and commits all the
//! records it changed in one batch.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument};
use trellis_store::{NodeStatus, NodeStatusRecord, Schedule, Store};
use trellis_workflow::{Node, Workflow};

use crate::error::StatusError;
use crate::events::{Cause, NoopNotifier, StatusEvent, StatusNotifier};
use crate::resolver::WorkflowResolver;

/// Result of a status change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
  /// `false` when the node already had the requested status.
  pub success: bool,
  /// Every record whose status changed, in the order the changes were made.
  pub changes: Vec<NodeStatusRecord>,
}

impl TransitionOutcome {
  fn unchanged() -> Self {
    Self {
      success: false,
      changes: Vec::new(),
    }
  }
}

/// Partial update of a node's assignment. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
  #[serde(default)]
  pub maintainer_id: Option<String>,
  #[serde(default)]
  pub schedule: Option<Schedule>,
}

/// Per-status node counts for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  pub pending: usize,
  pub in_progress: usize,
  pub completed: usize,
}

impl Progress {
  pub fn total(&self) -> usize {
    self.pending + self.in_progress + self.completed
  }

  pub fn is_finished(&self) -> bool {
    self.total() > 0 && self.completed == self.total()
  }

  fn count(&mut self, status: NodeStatus) {
    match status {
      NodeStatus::Pending => self.pending += 1,
      NodeStatus::InProgress => self.in_progress += 1,
      NodeStatus::Completed => self.completed += 1,
    }
  }
}

/// Records loaded during one operation, with the changes made to them.
struct Batch {
  records: HashMap<String, NodeStatusRecord>,
  changed: Vec<(String, NodeStatus, Cause)>,
}

impl Batch {
  fn new() -> Self {
    Self {
      records: HashMap::new(),
      changed: Vec::new(),
    }
  }

  fn status(&self, node_id: &str) -> Option<NodeStatus> {
    self.records.get(node_id).map(|r| r.status)
  }

  fn set(&mut self, node_id: &str, status: NodeStatus, cause: Cause) {
    if let Some(record) = self.records.get_mut(node_id)
      && record.status != status
    {
      self.changed.push((node_id.to_string(), record.status, cause));
      record.status = status;
    }
  }

  fn into_changes(mut self) -> (Vec<NodeStatusRecord>, Vec<(NodeStatus, Cause)>) {
    let mut records = Vec::with_capacity(self.changed.len());
    let mut meta = Vec::with_capacity(self.changed.len());
    for (node_id, from, cause) in self.changed {
      if let Some(record) = self.records.remove(&node_id) {
        records.push(record);
        meta.push((from, cause));
      }
    }
    (records, meta)
  }
}

/// Status service over a store, a workflow resolver and a notifier.
///
/// Use `StatusService::new()` for a service that discards events, or
/// `StatusService::with_notifier()` to observe every status change.
pub struct StatusService<S, R, N = NoopNotifier> {
  store: S,
  resolver: R,
  notifier: N,
  locks: Arc<LockMap>,
}

type LockMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

fn lock_map(locks: &LockMap) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
  locks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds a task lock. Removes the task's map entry on release when no other
/// caller holds or waits for it.
struct TaskGuard {
  task_id: String,
  locks: Arc<LockMap>,
  guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TaskGuard {
  fn drop(&mut self) {
    let mut locks = lock_map(&self.locks);
    self.guard.take();
    if let Some(lock) = locks.get(&self.task_id)
      && Arc::strong_count(lock) == 1
    {
      locks.remove(&self.task_id);
    }
  }
}

impl<S: Store, R: WorkflowResolver> StatusService<S, R, NoopNotifier> {
  pub fn new(store: S, resolver: R) -> Self {
    Self::with_notifier(store, resolver, NoopNotifier)
  }
}

impl<S: Store, R: WorkflowResolver, N: StatusNotifier> StatusService<S, R, N> {
  pub fn with_notifier(store: S, resolver: R, notifier: N) -> Self {
    Self {
      store,
      resolver,
      notifier,
      locks: Arc::new(LockMap::default()),
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn resolver(&self) -> &R {
    &self.resolver
  }

  /// The record of a node, creating and persisting its initial record on
  /// first access.
  #[instrument(skip(self))]
  pub async fn get_or_create(
    &self,
    task_id: &str,
    node_id: &str,
  ) -> Result<NodeStatusRecord, StatusError> {
    let (workflow, _guard) = self.lock_task(task_id).await?;
    let node = find_node(&workflow, task_id, node_id)?;

    if let Some(record) = self.store.get_record(task_id, node_id).await? {
      return Ok(record);
    }
    let record = NodeStatusRecord::initial(task_id, node_id, node.is_start());
    self.store.save_records(std::slice::from_ref(&record)).await?;
    info!(task_id, node_id, status = %record.status, "created node status record");
    Ok(record)
  }

  /// Records of every node of the task's workflow, in workflow order.
  ///
  /// Nodes never addressed before get their initial record persisted.
  #[instrument(skip(self))]
  pub async fn list_node_statuses(&self, task_id: &str) -> Result<Vec<NodeStatusRecord>, StatusError> {
    let (workflow, _guard) = self.lock_task(task_id).await?;

    let mut stored: HashMap<String, NodeStatusRecord> = self
      .store
      .list_records(task_id)
      .await?
      .into_iter()
      .map(|r| (r.node_id.clone(), r))
      .collect();

    let mut records = Vec::with_capacity(workflow.nodes().len());
    let mut created = Vec::new();
    for node in workflow.nodes() {
      match stored.remove(&node.id) {
        Some(record) => records.push(record),
        None => {
          let record = NodeStatusRecord::initial(task_id, &node.id, node.is_start());
          created.push(record.clone());
          records.push(record);
        }
      }
    }

    if !created.is_empty() {
      self.store.save_records(&created).await?;
      info!(task_id, created = created.len(), "created node status records");
    }
    Ok(records)
  }

  /// Mark an in-progress node completed and unlock the successors that
  /// become ready.
  #[instrument(skip(self))]
  pub async fn complete(&self, task_id: &str, node_id: &str) -> Result<TransitionOutcome, StatusError> {
    let (workflow, _guard) = self.lock_task(task_id).await?;
    find_node(&workflow, task_id, node_id)?;

    self.complete_locked(Batch::new(), &workflow, task_id, node_id).await
  }

  /// Completion cascade. The caller holds the task lock.
  async fn complete_locked(
    &self,
    mut batch: Batch,
    workflow: &Workflow,
    task_id: &str,
    node_id: &str,
  ) -> Result<TransitionOutcome, StatusError> {
    let current = self.load(&mut batch, workflow, task_id, node_id).await?;
    if current != NodeStatus::InProgress {
      return Err(StatusError::InvalidTransition {
        node_id: node_id.to_string(),
        from: current,
        to: NodeStatus::Completed,
      });
    }
    batch.set(node_id, NodeStatus::Completed, Cause::Completed);

    let graph = workflow.graph();
    for next in graph.downstream(node_id) {
      if self.load(&mut batch, workflow, task_id, next).await? != NodeStatus::Pending {
        continue;
      }
      let mut ready = true;
      for prev in graph.upstream(next) {
        if self.load(&mut batch, workflow, task_id, prev).await? != NodeStatus::Completed {
          ready = false;
          break;
        }
      }
      if ready {
        batch.set(next, NodeStatus::InProgress, Cause::Unlocked);
      }
    }

    let outcome = self.commit(task_id, batch).await?;
    info!(task_id, node_id, changes = outcome.changes.len(), "completed node");
    Ok(outcome)
  }

  /// Move a completed node back to in progress and reset all of its
  /// descendants to pending.
  #[instrument(skip(self))]
  pub async fn rollback(&self, task_id: &str, node_id: &str) -> Result<TransitionOutcome, StatusError> {
    let (workflow, _guard) = self.lock_task(task_id).await?;
    find_node(&workflow, task_id, node_id)?;

    self.rollback_locked(Batch::new(), &workflow, task_id, node_id).await
  }

  /// Rollback cascade. The caller holds the task lock.
  async fn rollback_locked(
    &self,
    mut batch: Batch,
    workflow: &Workflow,
    task_id: &str,
    node_id: &str,
  ) -> Result<TransitionOutcome, StatusError> {
    let current = self.load(&mut batch, workflow, task_id, node_id).await?;
    if current != NodeStatus::Completed {
      return Err(StatusError::InvalidTransition {
        node_id: node_id.to_string(),
        from: current,
        to: NodeStatus::InProgress,
      });
    }
    batch.set(node_id, NodeStatus::InProgress, Cause::RolledBack);

    for descendant in workflow.graph().descendants(node_id) {
      self.load(&mut batch, workflow, task_id, &descendant).await?;
      batch.set(&descendant, NodeStatus::Pending, Cause::Reset);
    }

    let outcome = self.commit(task_id, batch).await?;
    info!(task_id, node_id, changes = outcome.changes.len(), "rolled back node");
    Ok(outcome)
  }

  /// Request `target` for a node.
  ///
  /// `completed` completes an in-progress node and `in_progress` rolls back a
  /// completed one. Requesting the status the node already has succeeds
  /// without changes and reports `success: false`. Anything else is an
  /// invalid transition.
  #[instrument(skip(self))]
  pub async fn transition(
    &self,
    task_id: &str,
    node_id: &str,
    target: NodeStatus,
  ) -> Result<TransitionOutcome, StatusError> {
    let (workflow, _guard) = self.lock_task(task_id).await?;
    find_node(&workflow, task_id, node_id)?;

    let mut batch = Batch::new();
    let current = self.load(&mut batch, &workflow, task_id, node_id).await?;
    match (current, target) {
      (from, to) if from == to => Ok(TransitionOutcome::unchanged()),
      (NodeStatus::InProgress, NodeStatus::Completed) => {
        self.complete_locked(batch, &workflow, task_id, node_id).await
      }
      (NodeStatus::Completed, NodeStatus::InProgress) => {
        self.rollback_locked(batch, &workflow, task_id, node_id).await
      }
      (from, to) => Err(StatusError::InvalidTransition {
        node_id: node_id.to_string(),
        from,
        to,
      }),
    }
  }

  /// Update who works on a node and when. Legal in every status.
  #[instrument(skip(self))]
  pub async fn update_assignment(
    &self,
    task_id: &str,
    node_id: &str,
    assignment: Assignment,
  ) -> Result<NodeStatusRecord, StatusError> {
    self
      .modify(task_id, node_id, |record| {
        if let Some(maintainer_id) = assignment.maintainer_id {
          record.maintainer_id = Some(maintainer_id);
        }
        if let Some(schedule) = assignment.schedule {
          record.maintainer_schedule = Some(schedule);
        }
        Ok(record.clone())
      })
      .await
  }

  /// Count nodes per status without creating records.
  #[instrument(skip(self))]
  pub async fn progress(&self, task_id: &str) -> Result<Progress, StatusError> {
    let workflow = self.workflow(task_id).await?;
    let stored: HashMap<String, NodeStatus> = self
      .store
      .list_records(task_id)
      .await?
      .into_iter()
      .map(|r| (r.node_id, r.status))
      .collect();

    let mut progress = Progress::default();
    for node in workflow.nodes() {
      progress.count(
        stored
          .get(&node.id)
          .copied()
          .unwrap_or_else(|| initial_status(node)),
      );
    }
    Ok(progress)
  }

  /// Read-modify-write of one record under the task lock.
  pub(crate) async fn modify<T>(
    &self,
    task_id: &str,
    node_id: &str,
    apply: impl FnOnce(&mut NodeStatusRecord) -> Result<T, StatusError>,
  ) -> Result<T, StatusError> {
    let (workflow, _guard) = self.lock_task(task_id).await?;
    let mut record = read_record(&self.store, &workflow, task_id, node_id).await?;
    let value = apply(&mut record)?;
    self.store.save_records(std::slice::from_ref(&record)).await?;
    Ok(value)
  }

  /// The record of a node, or its initial record if none is stored. Never
  /// writes.
  pub(crate) async fn read(&self, task_id: &str, node_id: &str) -> Result<NodeStatusRecord, StatusError> {
    let workflow = self.workflow(task_id).await?;
    read_record(&self.store, &workflow, task_id, node_id).await
  }

  async fn workflow(&self, task_id: &str) -> Result<Arc<Workflow>, StatusError> {
    Ok(self.resolver.workflow_for_task(task_id).await?)
  }

  /// Resolve the task's workflow, then take its lock.
  ///
  /// Unknown tasks fail before a lock entry exists. The entry is dropped
  /// again once the last guard for the task is released.
  async fn lock_task(&self, task_id: &str) -> Result<(Arc<Workflow>, TaskGuard), StatusError> {
    let workflow = self.workflow(task_id).await?;
    let lock = {
      let mut locks = lock_map(&self.locks);
      Arc::clone(locks.entry(task_id.to_string()).or_default())
    };
    let guard = TaskGuard {
      task_id: task_id.to_string(),
      locks: Arc::clone(&self.locks),
      guard: Some(lock.lock_owned().await),
    };
    Ok((workflow, guard))
  }

  #[cfg(test)]
  pub(crate) fn lock_count(&self) -> usize {
    lock_map(&self.locks).len()
  }

  /// Status of `node_id` within `batch`, loading its record on first use.
  async fn load(
    &self,
    batch: &mut Batch,
    workflow: &Workflow,
    task_id: &str,
    node_id: &str,
  ) -> Result<NodeStatus, StatusError> {
    if let Some(status) = batch.status(node_id) {
      return Ok(status);
    }
    let record = match self.store.get_record(task_id, node_id).await? {
      Some(record) => record,
      None => {
        let node = find_node(workflow, task_id, node_id)?;
        NodeStatusRecord::initial(task_id, node_id, node.is_start())
      }
    };
    let status = record.status;
    batch.records.insert(node_id.to_string(), record);
    Ok(status)
  }

  /// Persist the changed records of `batch` in one write, then notify.
  async fn commit(&self, task_id: &str, batch: Batch) -> Result<TransitionOutcome, StatusError> {
    let (changes, meta) = batch.into_changes();
    if changes.is_empty() {
      return Ok(TransitionOutcome::unchanged());
    }
    self.store.save_records(&changes).await?;

    for (record, (from, cause)) in changes.iter().zip(meta) {
      self.notifier.notify(StatusEvent {
        task_id: task_id.to_string(),
        node_id: record.node_id.clone(),
        from,
        to: record.status,
        cause,
      });
    }

    Ok(TransitionOutcome {
      success: true,
      changes,
    })
  }
}

fn find_node<'w>(workflow: &'w Workflow, task_id: &str, node_id: &str) -> Result<&'w Node, StatusError> {
  workflow
    .get_node(node_id)
    .ok_or_else(|| StatusError::NodeNotFound {
      task_id: task_id.to_string(),
      node_id: node_id.to_string(),
    })
}

fn initial_status(node: &Node) -> NodeStatus {
  if node.is_start() {
    NodeStatus::InProgress
  } else {
    NodeStatus::Pending
  }
}

async fn read_record<S: Store>(
  store: &S,
  workflow: &Workflow,
  task_id: &str,
  node_id: &str,
) -> Result<NodeStatusRecord, StatusError> {
  let node = find_node(workflow, task_id, node_id)?;
  Ok(match store.get_record(task_id, node_id).await? {
    Some(record) => record,
    None => NodeStatusRecord::initial(task_id, node_id, node.is_start()),
  })
}
