//! Trellis Store
//!
//! This crate provides the storage trait and implementations for node status
//! records. Records are keyed by `(task_id, node_id)` and persisted either in
//! memory or in SQLite.
//!
//! The [`Store`] trait defines operations for:
//! - Reading a single record or every record of a task
//! - Writing a batch of records atomically

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{NodeStatus, NodeStatusRecord, Schedule, SubTask};

use std::sync::Arc;

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying the schema failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for node status records.
#[async_trait]
pub trait Store: Send + Sync {
  /// Get the record of one node, if it was ever written.
  async fn get_record(
    &self,
    task_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeStatusRecord>, Error>;

  /// List every record of a task, ordered by node id.
  async fn list_records(&self, task_id: &str) -> Result<Vec<NodeStatusRecord>, Error>;

  /// Insert or replace records. Either all of them are written or none.
  async fn save_records(&self, records: &[NodeStatusRecord]) -> Result<(), Error>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
  async fn get_record(
    &self,
    task_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeStatusRecord>, Error> {
    (**self).get_record(task_id, node_id).await
  }

  async fn list_records(&self, task_id: &str) -> Result<Vec<NodeStatusRecord>, Error> {
    (**self).list_records(task_id).await
  }

  async fn save_records(&self, records: &[NodeStatusRecord]) -> Result<(), Error> {
    (**self).save_records(records).await
  }
}
