//! Sub-task registry.
//!
//! Sub-tasks live inside their node's status record, so every operation is a
//! read-modify-write of that one record under the task lock.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use trellis_store::{Schedule, Store, SubTask};

use crate::error::StatusError;
use crate::events::StatusNotifier;
use crate::resolver::WorkflowResolver;
use crate::service::StatusService;

/// Partial update of a sub-task. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTaskUpdate {
  /// New name, unique within the node.
  #[serde(default)]
  pub rename: Option<String>,
  #[serde(default)]
  pub maintainer_id: Option<String>,
  #[serde(default)]
  pub schedule: Option<Schedule>,
}

impl<S: Store, R: WorkflowResolver, N: StatusNotifier> StatusService<S, R, N> {
  /// Sub-tasks of a node, in creation order.
  #[instrument(skip(self))]
  pub async fn list_sub_tasks(&self, task_id: &str, node_id: &str) -> Result<Vec<SubTask>, StatusError> {
    Ok(self.read(task_id, node_id).await?.sub_tasks)
  }

  /// Add a sub-task. Fails with `Conflict` if the node already has one with
  /// the same name.
  #[instrument(skip(self))]
  pub async fn create_sub_task(
    &self,
    task_id: &str,
    node_id: &str,
    sub_task: SubTask,
  ) -> Result<SubTask, StatusError> {
    let created = self
      .modify(task_id, node_id, |record| {
        if record.sub_task(&sub_task.name).is_some() {
          return Err(StatusError::Conflict {
            node_id: node_id.to_string(),
            name: sub_task.name.clone(),
          });
        }
        record.sub_tasks.push(sub_task.clone());
        Ok(sub_task)
      })
      .await?;
    info!(task_id, node_id, name = %created.name, "created sub-task");
    Ok(created)
  }

  /// Update and optionally rename a sub-task. A missing sub-task is
  /// reported before a colliding rename.
  #[instrument(skip(self))]
  pub async fn update_sub_task(
    &self,
    task_id: &str,
    node_id: &str,
    name: &str,
    update: SubTaskUpdate,
  ) -> Result<SubTask, StatusError> {
    self
      .modify(task_id, node_id, |record| {
        if record.sub_task(name).is_none() {
          return Err(StatusError::SubTaskNotFound {
            node_id: node_id.to_string(),
            name: name.to_string(),
          });
        }
        if let Some(new_name) = update.rename.as_deref()
          && new_name != name
          && record.sub_task(new_name).is_some()
        {
          return Err(StatusError::Conflict {
            node_id: node_id.to_string(),
            name: new_name.to_string(),
          });
        }

        let sub_task = record
          .sub_task_mut(name)
          .ok_or_else(|| StatusError::SubTaskNotFound {
            node_id: node_id.to_string(),
            name: name.to_string(),
          })?;
        if let Some(new_name) = update.rename {
          sub_task.name = new_name;
        }
        if let Some(maintainer_id) = update.maintainer_id {
          sub_task.maintainer_id = Some(maintainer_id);
        }
        if let Some(schedule) = update.schedule {
          sub_task.schedule = Some(schedule);
        }
        Ok(sub_task.clone())
      })
      .await
  }

  /// Remove a sub-task and return it.
  #[instrument(skip(self))]
  pub async fn remove_sub_task(
    &self,
    task_id: &str,
    node_id: &str,
    name: &str,
  ) -> Result<SubTask, StatusError> {
    let removed = self
      .modify(task_id, node_id, |record| {
        let index = record
          .sub_tasks
          .iter()
          .position(|s| s.name == name)
          .ok_or_else(|| StatusError::SubTaskNotFound {
            node_id: node_id.to_string(),
            name: name.to_string(),
          })?;
        Ok(record.sub_tasks.remove(index))
      })
      .await?;
    info!(task_id, node_id, name, "removed sub-task");
    Ok(removed)
  }
}
