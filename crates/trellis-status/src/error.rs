use thiserror::Error;
use trellis_store::NodeStatus;
use trellis_workflow::WorkflowError;

/// Errors that can occur while looking up the workflow of a task.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// No workflow type is assigned to the task.
  #[error("task not found: {0}")]
  TaskNotFound(String),

  /// The workflow type is not registered.
  #[error("workflow type not found: {0}")]
  WorkflowNotFound(String),

  /// The workflow definition failed validation.
  #[error("invalid workflow '{workflow_type}': {source}")]
  InvalidWorkflow {
    workflow_type: String,
    #[source]
    source: WorkflowError,
  },

  /// IO error when reading definition files.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Failed to parse definition JSON.
  #[error("invalid definition: {0}")]
  Json(#[from] serde_json::Error),
}

/// Errors surfaced by status and sub-task operations.
#[derive(Debug, Error)]
pub enum StatusError {
  #[error("task not found: {0}")]
  TaskNotFound(String),

  #[error("node '{node_id}' not found in the workflow of task '{task_id}'")]
  NodeNotFound { task_id: String, node_id: String },

  #[error("sub-task '{name}' not found on node '{node_id}'")]
  SubTaskNotFound { node_id: String, name: String },

  #[error("invalid transition for node '{node_id}': {from} -> {to}")]
  InvalidTransition {
    node_id: String,
    from: NodeStatus,
    to: NodeStatus,
  },

  #[error("sub-task '{name}' already exists on node '{node_id}'")]
  Conflict { node_id: String, name: String },

  #[error("workflow lookup failed: {0}")]
  Resolve(ResolveError),

  #[error("store error: {0}")]
  Store(#[from] trellis_store::Error),
}

impl From<ResolveError> for StatusError {
  fn from(err: ResolveError) -> Self {
    match err {
      ResolveError::TaskNotFound(task_id) => StatusError::TaskNotFound(task_id),
      other => StatusError::Resolve(other),
    }
  }
}
