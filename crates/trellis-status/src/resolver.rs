//! Task to workflow lookup.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};
use trellis_config::WorkflowDef;
use trellis_workflow::Workflow;

use crate::error::ResolveError;

/// File in a catalog directory mapping task ids to workflow types.
pub const TASKS_FILE: &str = "tasks.json";

/// Resolves the workflow a task follows.
///
/// Workflows are shared read-only between every task of the same type.
#[async_trait]
pub trait WorkflowResolver: Send + Sync {
  async fn workflow_for_task(&self, task_id: &str) -> Result<Arc<Workflow>, ResolveError>;
}

#[async_trait]
impl<R: WorkflowResolver + ?Sized> WorkflowResolver for Arc<R> {
  async fn workflow_for_task(&self, task_id: &str) -> Result<Arc<Workflow>, ResolveError> {
    (**self).workflow_for_task(task_id).await
  }
}

/// In-memory registry of workflow types and task assignments.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
  workflows: HashMap<String, Arc<Workflow>>,
  tasks: BTreeMap<String, String>,
}

impl WorkflowCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a validated workflow under `workflow_type`, replacing any
  /// previous one.
  pub fn register(&mut self, workflow_type: impl Into<String>, workflow: Workflow) -> Arc<Workflow> {
    let workflow = Arc::new(workflow);
    self
      .workflows
      .insert(workflow_type.into(), Arc::clone(&workflow));
    workflow
  }

  /// Validate and register a definition under its own workflow id.
  pub fn register_def(&mut self, def: WorkflowDef) -> Result<Arc<Workflow>, ResolveError> {
    let workflow_type = def.workflow_id.clone();
    let workflow = Workflow::from_def(def).map_err(|source| ResolveError::InvalidWorkflow {
      workflow_type: workflow_type.clone(),
      source,
    })?;
    Ok(self.register(workflow_type, workflow))
  }

  /// Assign `task_id` to a registered workflow type.
  pub fn assign(
    &mut self,
    task_id: impl Into<String>,
    workflow_type: impl Into<String>,
  ) -> Result<(), ResolveError> {
    let workflow_type = workflow_type.into();
    if !self.workflows.contains_key(&workflow_type) {
      return Err(ResolveError::WorkflowNotFound(workflow_type));
    }
    self.tasks.insert(task_id.into(), workflow_type);
    Ok(())
  }

  pub fn workflow(&self, workflow_type: &str) -> Option<Arc<Workflow>> {
    self.workflows.get(workflow_type).cloned()
  }

  pub fn workflow_type_of(&self, task_id: &str) -> Option<&str> {
    self.tasks.get(task_id).map(String::as_str)
  }

  /// Task ids with their workflow types, ordered by task id.
  pub fn tasks(&self) -> impl Iterator<Item = (&str, &str)> {
    self.tasks.iter().map(|(t, w)| (t.as_str(), w.as_str()))
  }
}

#[async_trait]
impl WorkflowResolver for WorkflowCatalog {
  async fn workflow_for_task(&self, task_id: &str) -> Result<Arc<Workflow>, ResolveError> {
    let workflow_type = self
      .workflow_type_of(task_id)
      .ok_or_else(|| ResolveError::TaskNotFound(task_id.to_string()))?;
    self
      .workflow(workflow_type)
      .ok_or_else(|| ResolveError::WorkflowNotFound(workflow_type.to_string()))
  }
}

/// Filesystem-backed workflow catalog.
///
/// Definitions are read once, at load time, from a directory:
/// ```text
/// {root}/
/// ├── review.json     (workflow type "review")
/// ├── release.json    (workflow type "release")
/// └── tasks.json      ({ "task-1": "review", ... })
/// ```
#[derive(Debug, Clone)]
pub struct FsWorkflowCatalog {
  root: PathBuf,
  catalog: WorkflowCatalog,
}

impl FsWorkflowCatalog {
  /// Load every definition and the task assignments under `root`.
  ///
  /// A missing `tasks.json` means no task is assigned yet.
  pub async fn load(root: impl Into<PathBuf>) -> Result<Self, ResolveError> {
    let root = root.into();
    let mut catalog = WorkflowCatalog::new();

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&root).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().is_some_and(|ext| ext == "json")
        && path.file_name().is_some_and(|name| name != TASKS_FILE)
      {
        paths.push(path);
      }
    }
    paths.sort();

    for path in paths {
      let Some(workflow_type) = path.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      let content = fs::read_to_string(&path).await?;
      let def: WorkflowDef = serde_json::from_str(&content)?;
      let workflow = Workflow::from_def(def).map_err(|source| ResolveError::InvalidWorkflow {
        workflow_type: workflow_type.to_string(),
        source,
      })?;
      debug!(workflow_type, nodes = workflow.nodes().len(), "loaded workflow definition");
      catalog.register(workflow_type, workflow);
    }

    let tasks_path = root.join(TASKS_FILE);
    if fs::try_exists(&tasks_path).await? {
      let content = fs::read_to_string(&tasks_path).await?;
      let tasks: BTreeMap<String, String> = serde_json::from_str(&content)?;
      for (task_id, workflow_type) in tasks {
        catalog.assign(task_id, workflow_type)?;
      }
    }

    info!(root = %root.display(), tasks = catalog.tasks.len(), "loaded workflow catalog");
    Ok(Self { root, catalog })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn catalog(&self) -> &WorkflowCatalog {
    &self.catalog
  }
}

#[async_trait]
impl WorkflowResolver for FsWorkflowCatalog {
  async fn workflow_for_task(&self, task_id: &str) -> Result<Arc<Workflow>, ResolveError> {
    self.catalog.workflow_for_task(task_id).await
  }
}
