use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live status of one workflow node within one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NodeStatus {
  Pending,
  InProgress,
  Completed,
}

impl NodeStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeStatus::Pending => "pending",
      NodeStatus::InProgress => "in_progress",
      NodeStatus::Completed => "completed",
    }
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A date range during which someone is expected to work on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

/// A named piece of work under a node. Names are unique within a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub maintainer_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub schedule: Option<Schedule>,
}

impl SubTask {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      maintainer_id: None,
      schedule: None,
    }
  }
}

/// The persisted status of one node for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatusRecord {
  pub task_id: String,
  pub node_id: String,
  pub status: NodeStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub maintainer_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub maintainer_schedule: Option<Schedule>,
  #[serde(default)]
  pub sub_tasks: Vec<SubTask>,
}

impl NodeStatusRecord {
  pub fn new(task_id: impl Into<String>, node_id: impl Into<String>, status: NodeStatus) -> Self {
    Self {
      task_id: task_id.into(),
      node_id: node_id.into(),
      status,
      maintainer_id: None,
      maintainer_schedule: None,
      sub_tasks: Vec::new(),
    }
  }

  /// The record a node gets the first time it is addressed: the start node
  /// begins in progress, every other node pending.
  pub fn initial(task_id: impl Into<String>, node_id: impl Into<String>, is_start: bool) -> Self {
    let status = if is_start {
      NodeStatus::InProgress
    } else {
      NodeStatus::Pending
    };
    Self::new(task_id, node_id, status)
  }

  pub fn is_completed(&self) -> bool {
    self.status == NodeStatus::Completed
  }

  pub fn sub_task(&self, name: &str) -> Option<&SubTask> {
    self.sub_tasks.iter().find(|s| s.name == name)
  }

  pub fn sub_task_mut(&mut self, name: &str) -> Option<&mut SubTask> {
    self.sub_tasks.iter_mut().find(|s| s.name == name)
  }
}
