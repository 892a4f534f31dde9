use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use trellis_config::WorkflowDef;
use trellis_layout::{LayoutConfig, LayoutEngine};
use trellis_status::{Assignment, FsWorkflowCatalog, StatusService, SubTaskUpdate};
use trellis_store::{NodeStatus, Schedule, SqliteStore, SubTask};
use trellis_workflow::Node;

type Service = StatusService<SqliteStore, FsWorkflowCatalog>;

/// Trellis - workflow diagrams and per-task node status tracking
#[derive(Parser)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.trellis)
  #[arg(long, global = true, env = "TRELLIS_DATA_DIR")]
  data_dir: Option<PathBuf>,

  /// Status database URL (default: sqlite://{data_dir}/trellis.db)
  #[arg(long, global = true, env = "TRELLIS_DATABASE_URL")]
  database: Option<String>,

  /// Directory of workflow definitions and tasks.json (default: {data_dir}/workflows)
  #[arg(long, global = true)]
  workflows: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Compute the diagram layout of a workflow definition
  Layout {
    /// Path to the workflow file (JSON). Reads stdin when omitted.
    workflow_file: Option<PathBuf>,

    /// Horizontal distance between layers
    #[arg(long)]
    layer_width: Option<f64>,

    /// Vertical distance between nodes of one layer
    #[arg(long)]
    node_height: Option<f64>,
  },

  #[command(flatten)]
  Tracking(TrackingCommand),
}

#[derive(Subcommand)]
enum TrackingCommand {
  /// Show the status of every node of a task
  Status {
    task_id: String,

    /// Print per-status counts instead of records
    #[arg(long)]
    progress: bool,
  },

  /// Complete an in-progress node
  Complete { task_id: String, node_id: String },

  /// Roll a completed node back to in progress
  Rollback { task_id: String, node_id: String },

  /// Request a status for a node (completed or in-progress)
  Transition {
    task_id: String,
    node_id: String,
    #[arg(value_enum)]
    status: TargetStatus,
  },

  /// Assign a maintainer and/or schedule to a node
  Assign {
    task_id: String,
    node_id: String,

    #[arg(long)]
    maintainer: Option<String>,

    #[command(flatten)]
    schedule: ScheduleArgs,
  },

  /// Manage the sub-tasks of a node
  Subtask {
    #[command(subcommand)]
    action: SubtaskAction,
  },
}

#[derive(Subcommand)]
enum SubtaskAction {
  /// List the sub-tasks of a node
  List { task_id: String, node_id: String },

  /// Add a sub-task
  Add {
    task_id: String,
    node_id: String,
    name: String,

    #[arg(long)]
    maintainer: Option<String>,

    #[command(flatten)]
    schedule: ScheduleArgs,
  },

  /// Update or rename a sub-task
  Update {
    task_id: String,
    node_id: String,
    name: String,

    #[arg(long)]
    rename: Option<String>,

    #[arg(long)]
    maintainer: Option<String>,

    #[command(flatten)]
    schedule: ScheduleArgs,
  },

  /// Remove a sub-task
  Remove {
    task_id: String,
    node_id: String,
    name: String,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetStatus {
  InProgress,
  Completed,
}

impl From<TargetStatus> for NodeStatus {
  fn from(status: TargetStatus) -> Self {
    match status {
      TargetStatus::InProgress => NodeStatus::InProgress,
      TargetStatus::Completed => NodeStatus::Completed,
    }
  }
}

#[derive(clap::Args)]
struct ScheduleArgs {
  /// Schedule start (RFC 3339)
  #[arg(long, requires = "end")]
  start: Option<DateTime<Utc>>,

  /// Schedule end (RFC 3339)
  #[arg(long, requires = "start")]
  end: Option<DateTime<Utc>>,
}

impl ScheduleArgs {
  fn into_schedule(self) -> Result<Option<Schedule>> {
    match (self.start, self.end) {
      (Some(start), Some(end)) => {
        if end < start {
          bail!("schedule ends before it starts: {} < {}", end, start);
        }
        Ok(Some(Schedule { start, end }))
      }
      _ => Ok(None),
    }
  }
}

struct Paths {
  data_dir: PathBuf,
  database: String,
  workflows: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .with_target(false)
    .init();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".trellis"),
  };
  let paths = Paths {
    database: cli
      .database
      .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("trellis.db").display())),
    workflows: cli.workflows.unwrap_or_else(|| data_dir.join("workflows")),
    data_dir,
  };

  let Some(command) = cli.command else {
    println!("trellis - use --help to see available commands");
    return Ok(());
  };

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match command {
      Commands::Layout {
        workflow_file,
        layer_width,
        node_height,
      } => run_layout(workflow_file.as_deref(), layer_width, node_height).await,
      Commands::Tracking(command) => {
        let service = open_service(&paths).await?;
        run_tracking(&service, command).await
      }
    }
  })
}

async fn run_layout(
  workflow_file: Option<&Path>,
  layer_width: Option<f64>,
  node_height: Option<f64>,
) -> Result<()> {
  let content = match workflow_file {
    Some(path) => tokio::fs::read_to_string(path)
      .await
      .with_context(|| format!("failed to read workflow file: {}", path.display()))?,
    None => read_stdin()?,
  };
  let def: WorkflowDef = serde_json::from_str(&content).context("failed to parse workflow definition")?;
  debug!(workflow_id = %def.workflow_id, nodes = def.nodes.len(), "loaded workflow definition");

  let defaults = LayoutConfig::default();
  let config = LayoutConfig {
    layer_width: layer_width.unwrap_or(defaults.layer_width),
    node_height: node_height.unwrap_or(defaults.node_height),
  };

  // Lenient: the layout reports malformed input instead of rejecting it.
  let nodes: Vec<Node> = def.nodes.into_list().into_iter().map(Node::from).collect();
  let layout = LayoutEngine::new(config).layout(&nodes);
  if layout.is_malformed() {
    eprintln!("{} edge(s) or node(s) could not be drawn", layout.diagnostics.len());
  }

  print_json(&layout)
}

async fn open_service(paths: &Paths) -> Result<Service> {
  tokio::fs::create_dir_all(&paths.data_dir)
    .await
    .with_context(|| format!("failed to create data directory: {}", paths.data_dir.display()))?;

  let store = SqliteStore::connect(&paths.database)
    .await
    .with_context(|| format!("failed to open status database: {}", paths.database))?;
  let catalog = FsWorkflowCatalog::load(&paths.workflows)
    .await
    .with_context(|| format!("failed to load workflows from {}", paths.workflows.display()))?;

  Ok(StatusService::new(store, catalog))
}

async fn run_tracking(service: &Service, command: TrackingCommand) -> Result<()> {
  match command {
    TrackingCommand::Status { task_id, progress } => {
      if progress {
        print_json(&service.progress(&task_id).await?)
      } else {
        print_json(&service.list_node_statuses(&task_id).await?)
      }
    }
    TrackingCommand::Complete { task_id, node_id } => {
      print_json(&service.complete(&task_id, &node_id).await?)
    }
    TrackingCommand::Rollback { task_id, node_id } => {
      print_json(&service.rollback(&task_id, &node_id).await?)
    }
    TrackingCommand::Transition {
      task_id,
      node_id,
      status,
    } => print_json(
      &service
        .transition(&task_id, &node_id, status.into())
        .await?,
    ),
    TrackingCommand::Assign {
      task_id,
      node_id,
      maintainer,
      schedule,
    } => {
      let assignment = Assignment {
        maintainer_id: maintainer,
        schedule: schedule.into_schedule()?,
      };
      print_json(&service.update_assignment(&task_id, &node_id, assignment).await?)
    }
    TrackingCommand::Subtask { action } => run_subtask(service, action).await,
  }
}

async fn run_subtask(service: &Service, action: SubtaskAction) -> Result<()> {
  match action {
    SubtaskAction::List { task_id, node_id } => {
      print_json(&service.list_sub_tasks(&task_id, &node_id).await?)
    }
    SubtaskAction::Add {
      task_id,
      node_id,
      name,
      maintainer,
      schedule,
    } => {
      let sub_task = SubTask {
        name,
        maintainer_id: maintainer,
        schedule: schedule.into_schedule()?,
      };
      print_json(&service.create_sub_task(&task_id, &node_id, sub_task).await?)
    }
    SubtaskAction::Update {
      task_id,
      node_id,
      name,
      rename,
      maintainer,
      schedule,
    } => {
      let update = SubTaskUpdate {
        rename,
        maintainer_id: maintainer,
        schedule: schedule.into_schedule()?,
      };
      print_json(
        &service
          .update_sub_task(&task_id, &node_id, &name, update)
          .await?,
      )
    }
    SubtaskAction::Remove {
      task_id,
      node_id,
      name,
    } => print_json(&service.remove_sub_task(&task_id, &node_id, &name).await?),
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn read_stdin() -> Result<String> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    bail!("no workflow file given and nothing piped on stdin");
  }
  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read workflow from stdin")?;
  Ok(input)
}
