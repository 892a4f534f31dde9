use std::str::FromStr;

use async_trait::async_trait;
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::types::Json;
use tracing::debug;

use crate::{Error, NodeStatus, NodeStatusRecord, Schedule, Store, SubTask};

/// SQLite-based store implementation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
  pool: SqlitePool,
}

/// Row shape of the `node_statuses` table.
#[derive(FromRow)]
struct RecordRow {
  task_id: String,
  node_id: String,
  status: NodeStatus,
  maintainer_id: Option<String>,
  maintainer_schedule: Option<Json<Schedule>>,
  sub_tasks: Json<Vec<SubTask>>,
}

impl From<RecordRow> for NodeStatusRecord {
  fn from(row: RecordRow) -> Self {
    Self {
      task_id: row.task_id,
      node_id: row.node_id,
      status: row.status,
      maintainer_id: row.maintainer_id,
      maintainer_schedule: row.maintainer_schedule.map(|s| s.0),
      sub_tasks: row.sub_tasks.0,
    }
  }
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (creating if missing) the database at `url` and apply migrations.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    sqlx::migrate!("../../migrations").run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn get_record(
    &self,
    task_id: &str,
    node_id: &str,
  ) -> Result<Option<NodeStatusRecord>, Error> {
    let row: Option<RecordRow> = sqlx::query_as(
      r#"
      SELECT task_id, node_id, status, maintainer_id, maintainer_schedule, sub_tasks
      FROM node_statuses
      WHERE task_id = ? AND node_id = ?
      "#,
    )
    .bind(task_id)
    .bind(node_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(NodeStatusRecord::from))
  }

  async fn list_records(&self, task_id: &str) -> Result<Vec<NodeStatusRecord>, Error> {
    let rows: Vec<RecordRow> = sqlx::query_as(
      r#"
      SELECT task_id, node_id, status, maintainer_id, maintainer_schedule, sub_tasks
      FROM node_statuses
      WHERE task_id = ?
      ORDER BY node_id ASC
      "#,
    )
    .bind(task_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(NodeStatusRecord::from).collect())
  }

  async fn save_records(&self, records: &[NodeStatusRecord]) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    for record in records {
      sqlx::query(
        r#"
        INSERT INTO node_statuses (task_id, node_id, status, maintainer_id, maintainer_schedule, sub_tasks)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (task_id, node_id) DO UPDATE SET
          status = excluded.status,
          maintainer_id = excluded.maintainer_id,
          maintainer_schedule = excluded.maintainer_schedule,
          sub_tasks = excluded.sub_tasks
        "#,
      )
      .bind(&record.task_id)
      .bind(&record.node_id)
      .bind(record.status)
      .bind(&record.maintainer_id)
      .bind(record.maintainer_schedule.as_ref().map(Json))
      .bind(Json(&record.sub_tasks))
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    debug!(count = records.len(), "saved node status records");
    Ok(())
  }
}
