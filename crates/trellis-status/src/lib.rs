//! Trellis Status
//!
//! This crate tracks the live status of every workflow node of every task.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      StatusService                          │
//! │  - complete / rollback / transition                         │
//! │  - assignments, progress, sub-tasks                         │
//! │  - per-task lock, batched writes                            │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ WorkflowResolver │ │      Store       │ │  StatusNotifier  │
//! │ task -> Workflow │ │ (task, node) ->  │ │  StatusEvent per │
//! │ (shared, Arc)    │ │ NodeStatusRecord │ │  changed node    │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trellis_status::{StatusService, WorkflowCatalog};
//! use trellis_store::MemoryStore;
//!
//! let mut catalog = WorkflowCatalog::new();
//! catalog.register_def(def)?;
//! catalog.assign("task-1", "review")?;
//!
//! let service = StatusService::new(MemoryStore::new(), catalog);
//! let outcome = service.complete("task-1", "start").await?;
//! ```

mod error;
mod events;
mod resolver;
mod service;
mod subtasks;

pub use error::{ResolveError, StatusError};
pub use events::{Cause, ChannelNotifier, NoopNotifier, StatusEvent, StatusNotifier};
pub use resolver::{FsWorkflowCatalog, TASKS_FILE, WorkflowCatalog, WorkflowResolver};
pub use service::{Assignment, Progress, StatusService, TransitionOutcome};
pub use subtasks::SubTaskUpdate;
